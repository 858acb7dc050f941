// Copyright (C) 2025 Paul Hampson
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License version 3 as  published by the
// Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

//! Collaborators the protocol drives but does not implement: the radio and the
//! flash programming subsystem.

use core::fmt::Debug;

/// Packet radio. Sends and receives whole packets of at most
/// `lora_ota_messages::MAX_PACKET_SIZE` bytes; addressing and duty cycling are
/// the implementation's business.
pub trait Transport {
    type Error: Debug;

    fn initialize(&mut self) -> Result<(), Self::Error>;

    fn is_packet_available(&mut self) -> bool;

    /// Copies the next packet into `buffer` and returns its length. `Ok(0)` means
    /// nothing was received.
    fn receive_packet(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    fn send_packet(&mut self, packet: &[u8]) -> Result<(), Self::Error>;
}

/// Destination for a received image.
///
/// Bytes arrive strictly in order; `write_next` appends at the current cursor.
pub trait FlashSink {
    type Error: Debug;

    /// Get ready to receive `total_size` bytes.
    fn prepare(&mut self, total_size: u32) -> Result<(), Self::Error>;

    /// Append `bytes`, returning how many were written. Anything short of
    /// `bytes.len()` fails the session.
    fn write_next(&mut self, bytes: &[u8]) -> Result<usize, Self::Error>;

    /// Make the assembled image durable and bootable.
    fn commit(&mut self) -> Result<(), Self::Error>;

    /// Throw away a partially written image. Best effort.
    fn discard(&mut self);

    /// Switch to the committed image, normally by restarting the device. Called
    /// once after a successful commit.
    fn apply_and_restart(&mut self) {}
}

/// Flash sink for devices that only ever send firmware. Every incoming transfer
/// is refused at `prepare`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFlash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveUnsupported;

impl FlashSink for NoFlash {
    type Error = ReceiveUnsupported;

    fn prepare(&mut self, _total_size: u32) -> Result<(), Self::Error> {
        Err(ReceiveUnsupported)
    }

    fn write_next(&mut self, _bytes: &[u8]) -> Result<usize, Self::Error> {
        Err(ReceiveUnsupported)
    }

    fn commit(&mut self) -> Result<(), Self::Error> {
        Err(ReceiveUnsupported)
    }

    fn discard(&mut self) {}
}
