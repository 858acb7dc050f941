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

use std::io::{BufRead, Error as IoError, ErrorKind, Read, Result as IoResult, Write};
use std::time::Duration;

use circular_buffer::CircularBuffer;
use lora_ota_core::{MAX_PACKET_SIZE, Transport};

const LENGTH_PREFIX_SIZE: usize = 2;
const RX_BUFFER_SIZE: usize = 1024;

/// Splits a byte stream into packets, each preceded by a big-endian u16 length.
/// Frames longer than a radio packet are skipped.
pub(crate) struct FrameReader<const N: usize> {
    buffer: CircularBuffer<N, u8>,
    discard_remaining: usize,
}

impl<const N: usize> FrameReader<N> {
    pub(crate) fn new() -> Self {
        Self {
            buffer: CircularBuffer::new(),
            discard_remaining: 0,
        }
    }

    pub(crate) fn free_space(&self) -> usize {
        self.buffer.capacity() - self.buffer.len()
    }

    /// Appends as many of `bytes` as fit and returns that count.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> usize {
        let count = bytes.len().min(self.free_space());
        self.buffer.extend_from_slice(&bytes[..count]);
        count
    }

    /// Copies the next complete packet into `out` and returns its length.
    pub(crate) fn next_frame(&mut self, out: &mut [u8]) -> Option<usize> {
        loop {
            if self.discard_remaining > 0 {
                let skipped = self.discard_remaining.min(self.buffer.len());
                self.buffer.consume(skipped);
                self.discard_remaining -= skipped;
                if self.discard_remaining > 0 {
                    return None;
                }
            }

            let bytes = self.buffer.make_contiguous();
            if bytes.len() < LENGTH_PREFIX_SIZE {
                return None;
            }
            let frame_len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;

            if frame_len == 0 {
                log::trace!("Skipping empty frame");
                self.buffer.consume(LENGTH_PREFIX_SIZE);
                continue;
            }
            if frame_len > MAX_PACKET_SIZE || frame_len > out.len() {
                log::warn!("Dropping {} byte frame, too large for a radio packet", frame_len);
                self.buffer.consume(LENGTH_PREFIX_SIZE);
                self.discard_remaining = frame_len;
                continue;
            }
            if bytes.len() < LENGTH_PREFIX_SIZE + frame_len {
                log::trace!("Need {} bytes to decode", LENGTH_PREFIX_SIZE + frame_len);
                return None;
            }

            out[..frame_len].copy_from_slice(&bytes[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + frame_len]);
            self.buffer.consume(LENGTH_PREFIX_SIZE + frame_len);
            return Some(frame_len);
        }
    }
}

/// LoRa modem on a serial port. The modem forwards every radio packet it hears
/// as a length-prefixed frame and transmits every frame written to it.
pub(crate) struct SerialRadio {
    port: Box<dyn serialport::SerialPort>,
    frames: FrameReader<RX_BUFFER_SIZE>,
    pending: [u8; MAX_PACKET_SIZE],
    pending_len: usize,
}

impl SerialRadio {
    pub(crate) fn open(port_name: &str, baud_rate: u32) -> IoResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| IoError::new(ErrorKind::ConnectionRefused, e.to_string()))?;

        Ok(Self {
            port,
            frames: FrameReader::new(),
            pending: [0u8; MAX_PACKET_SIZE],
            pending_len: 0,
        })
    }

    fn pull_bytes(&mut self) -> IoResult<()> {
        let mut scratch = [0u8; 256];
        let waiting = self.port.bytes_to_read()? as usize;
        let count = waiting.min(self.frames.free_space()).min(scratch.len());
        if count == 0 {
            return Ok(());
        }

        let read = self.port.read(&mut scratch[..count])?;
        log::trace!("Read {} bytes from serial", read);
        self.frames.push(&scratch[..read]);
        Ok(())
    }
}

impl Transport for SerialRadio {
    type Error = IoError;

    fn initialize(&mut self) -> IoResult<()> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }

    fn is_packet_available(&mut self) -> bool {
        if self.pending_len == 0 {
            if let Err(e) = self.pull_bytes() {
                log::warn!("Serial read failed: {}", e);
            }
            self.pending_len = self.frames.next_frame(&mut self.pending).unwrap_or(0);
        }
        self.pending_len > 0
    }

    fn receive_packet(&mut self, buffer: &mut [u8]) -> IoResult<usize> {
        if !self.is_packet_available() {
            return Ok(0);
        }
        let len = self.pending_len;
        if len > buffer.len() {
            return Err(IoError::new(ErrorKind::InvalidInput, "Receive buffer too small"));
        }
        buffer[..len].copy_from_slice(&self.pending[..len]);
        self.pending_len = 0;
        Ok(len)
    }

    fn send_packet(&mut self, packet: &[u8]) -> IoResult<()> {
        let length = u16::try_from(packet.len())
            .map_err(|_| IoError::new(ErrorKind::InvalidData, "Packet too large"))?;
        self.port.write_all(&length.to_be_bytes())?;
        self.port.write_all(packet)?;
        self.port.flush()?;

        log::trace!("Sent packet of {} bytes", packet.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u16).to_be_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn frame_split_across_reads_is_reassembled() {
        let mut reader = FrameReader::<64>::new();
        let mut out = [0u8; MAX_PACKET_SIZE];
        let bytes = frame(&[0x03, 0x05, 0x00]);

        reader.push(&bytes[..1]);
        assert_eq!(reader.next_frame(&mut out), None);
        reader.push(&bytes[1..3]);
        assert_eq!(reader.next_frame(&mut out), None);
        reader.push(&bytes[3..]);
        assert_eq!(reader.next_frame(&mut out), Some(3));
        assert_eq!(&out[..3], &[0x03, 0x05, 0x00]);
        assert_eq!(reader.next_frame(&mut out), None);
    }

    #[test]
    fn back_to_back_frames_come_out_in_order() {
        let mut reader = FrameReader::<64>::new();
        let mut out = [0u8; MAX_PACKET_SIZE];
        let mut bytes = frame(&[0x05]);
        bytes.extend(frame(&[0x04, 0x01, 0x00]));
        reader.push(&bytes);

        assert_eq!(reader.next_frame(&mut out), Some(1));
        assert_eq!(out[0], 0x05);
        assert_eq!(reader.next_frame(&mut out), Some(3));
        assert_eq!(&out[..3], &[0x04, 0x01, 0x00]);
    }

    #[test]
    fn oversized_frame_is_skipped() {
        let mut reader = FrameReader::<64>::new();
        let mut out = [0u8; MAX_PACKET_SIZE];
        let junk = frame(&[0xEE; 300]);

        for piece in junk.chunks(50) {
            assert_eq!(reader.push(piece), piece.len());
            assert_eq!(reader.next_frame(&mut out), None);
        }
        reader.push(&frame(&[0x06]));
        assert_eq!(reader.next_frame(&mut out), Some(1));
        assert_eq!(out[0], 0x06);
    }

    #[test]
    fn empty_frames_are_ignored() {
        let mut reader = FrameReader::<16>::new();
        let mut out = [0u8; MAX_PACKET_SIZE];
        reader.push(&[0, 0, 0, 0]);
        reader.push(&frame(&[0x05]));
        assert_eq!(reader.next_frame(&mut out), Some(1));
    }

    #[test]
    fn push_stops_at_capacity() {
        let mut reader = FrameReader::<8>::new();
        assert_eq!(reader.push(&[1; 12]), 8);
        assert_eq!(reader.free_space(), 0);
    }
}
