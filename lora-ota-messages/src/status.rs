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

use crate::custom_data_types::TransferState;

/// Encoded size of a `StatusReport`.
pub const STATUS_REPORT_SIZE: usize = 4;

/// Answer to a Status request: where the responding device is in its transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub state: TransferState,
    pub progress_percent: u8,
    /// Next expected chunk when receiving, chunk awaiting acknowledgment when sending
    pub chunk_index: u16,
}

impl StatusReport {
    pub(crate) fn write_to(&self, out: &mut [u8]) {
        out[0] = self.state as u8;
        out[1] = self.progress_percent;
        out[2..STATUS_REPORT_SIZE].copy_from_slice(&self.chunk_index.to_le_bytes());
    }

    /// Reads a report from `bytes`, which must hold at least `STATUS_REPORT_SIZE` bytes.
    /// Returns the raw state byte if it is not a known state.
    pub(crate) fn read_from(bytes: &[u8]) -> Result<Self, u8> {
        Ok(Self {
            state: TransferState::try_from(bytes[0])?,
            progress_percent: bytes[1],
            chunk_index: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }
}
