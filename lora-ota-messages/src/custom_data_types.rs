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

use core::fmt;

use crate::VERSION_FIELD_SIZE;

/// Fixed width, NUL terminated firmware version label as carried in the Init message.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionLabel {
    bytes: [u8; VERSION_FIELD_SIZE],
}

impl VersionLabel {
    /// Builds a label from `text`, truncating to the field width on a character boundary.
    pub fn new(text: &str) -> Self {
        let mut end = text.len().min(VERSION_FIELD_SIZE - 1);
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = [0u8; VERSION_FIELD_SIZE];
        bytes[..end].copy_from_slice(&text.as_bytes()[..end]);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; VERSION_FIELD_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; VERSION_FIELD_SIZE] {
        &self.bytes
    }

    /// The label text up to the first NUL. A label from the wire that is not valid
    /// UTF-8 is cut at the last valid character.
    pub fn as_str(&self) -> &str {
        let len = self
            .bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(VERSION_FIELD_SIZE);
        match core::str::from_utf8(&self.bytes[..len]) {
            Ok(text) => text,
            Err(e) => core::str::from_utf8(&self.bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

impl fmt::Debug for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionLabel({:?})", self.as_str())
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer state of a device, as reported in Status messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransferState {
    #[default]
    Idle = 0,
    Receiving = 1,
    Transmitting = 2,
    Validating = 3,
    Error = 4,
}

impl TryFrom<u8> for TransferState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(TransferState::Idle),
            1 => Ok(TransferState::Receiving),
            2 => Ok(TransferState::Transmitting),
            3 => Ok(TransferState::Validating),
            4 => Ok(TransferState::Error),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_label_is_nul_padded() {
        let label = VersionLabel::new("2.0.0");
        assert_eq!(label.as_str(), "2.0.0");
        assert_eq!(&label.as_bytes()[..6], b"2.0.0\0");
        assert!(label.as_bytes()[5..].iter().all(|b| *b == 0));
    }

    #[test]
    fn long_label_is_truncated_to_fifteen_bytes() {
        let label = VersionLabel::new("1.2.3-release-candidate");
        assert_eq!(label.as_str(), "1.2.3-release-c");
        assert_eq!(label.as_bytes()[VERSION_FIELD_SIZE - 1], 0);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 14 ASCII bytes followed by a two byte character straddling the limit
        let label = VersionLabel::new("abcdefghijklmné");
        assert_eq!(label.as_str(), "abcdefghijklmn");
    }

    #[test]
    fn garbage_from_the_wire_is_cut_at_invalid_utf8() {
        let mut raw = [0u8; VERSION_FIELD_SIZE];
        raw[..4].copy_from_slice(b"v1\xFF9");
        assert_eq!(VersionLabel::from_bytes(raw).as_str(), "v1");
    }

    #[test]
    fn transfer_state_round_trips_through_u8() {
        for state in [
            TransferState::Idle,
            TransferState::Receiving,
            TransferState::Transmitting,
            TransferState::Validating,
            TransferState::Error,
        ] {
            assert_eq!(TransferState::try_from(state as u8), Ok(state));
        }
        assert_eq!(TransferState::try_from(9), Err(9));
    }
}
