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

use core::ops::Range;

use crate::custom_data_types::VersionLabel;
use crate::transfer::{CHUNK_SIZE, METADATA_SIZE, VERSION_FIELD_SIZE};

/// Describes the image being transferred. Sent by the sender in the Init message
/// and held by the receiver for the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareMetadata {
    pub total_size: u32,
    pub total_chunks: u16,
    pub crc32: u32,
    pub version: VersionLabel,
    pub protocol_version: u8,
}

impl FirmwareMetadata {
    /// Number of chunks needed for an image of `total_size` bytes.
    ///
    /// Returns `None` for an empty image or one that needs more chunks than a
    /// chunk index can address.
    pub fn chunk_count(total_size: u32) -> Option<u16> {
        if total_size == 0 {
            return None;
        }
        let chunks = total_size.div_ceil(CHUNK_SIZE as u32);
        u16::try_from(chunks).ok()
    }

    /// True if the size is non-zero and the chunk count agrees with it.
    pub fn is_consistent(&self) -> bool {
        Self::chunk_count(self.total_size) == Some(self.total_chunks)
    }

    /// Payload length of chunk `index`: a full chunk, or the remainder for the last one.
    pub fn chunk_len(&self, index: u16) -> Option<u16> {
        self.chunk_range(index).map(|range| range.len() as u16)
    }

    /// Byte range of chunk `index` within the image.
    pub fn chunk_range(&self, index: u16) -> Option<Range<usize>> {
        if index >= self.total_chunks {
            return None;
        }
        let start = index as usize * CHUNK_SIZE;
        let end = (start + CHUNK_SIZE).min(self.total_size as usize);
        if start >= end {
            return None;
        }
        Some(start..end)
    }

    pub(crate) fn write_to(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.total_size.to_le_bytes());
        out[4..6].copy_from_slice(&self.total_chunks.to_le_bytes());
        out[6..10].copy_from_slice(&self.crc32.to_le_bytes());
        out[10..10 + VERSION_FIELD_SIZE].copy_from_slice(self.version.as_bytes());
        out[METADATA_SIZE - 1] = self.protocol_version;
    }

    /// Reads metadata from `bytes`, which must hold at least `METADATA_SIZE` bytes.
    pub(crate) fn read_from(bytes: &[u8]) -> Self {
        let mut version = [0u8; VERSION_FIELD_SIZE];
        version.copy_from_slice(&bytes[10..10 + VERSION_FIELD_SIZE]);

        Self {
            total_size: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            total_chunks: u16::from_le_bytes([bytes[4], bytes[5]]),
            crc32: u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
            version: VersionLabel::from_bytes(version),
            protocol_version: bytes[METADATA_SIZE - 1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PROTOCOL_VERSION;

    fn metadata_for(total_size: u32) -> FirmwareMetadata {
        FirmwareMetadata {
            total_size,
            total_chunks: FirmwareMetadata::chunk_count(total_size).unwrap(),
            crc32: 0,
            version: VersionLabel::new("test"),
            protocol_version: PROTOCOL_VERSION,
        }
    }

    #[test]
    fn chunk_count_is_ceiling_of_size() {
        assert_eq!(FirmwareMetadata::chunk_count(0), None);
        assert_eq!(FirmwareMetadata::chunk_count(1), Some(1));
        assert_eq!(FirmwareMetadata::chunk_count(240), Some(1));
        assert_eq!(FirmwareMetadata::chunk_count(241), Some(2));
        assert_eq!(FirmwareMetadata::chunk_count(480), Some(2));
        assert_eq!(FirmwareMetadata::chunk_count(240 * 65535), Some(65535));
        assert_eq!(FirmwareMetadata::chunk_count(240 * 65535 + 1), None);
    }

    #[test]
    fn chunk_lengths_reconstruct_the_image_size() {
        for size in [1u32, 16, 239, 240, 241, 479, 480, 481, 1000, 4096] {
            let metadata = metadata_for(size);
            let mut next_start = 0usize;
            for index in 0..metadata.total_chunks {
                let range = metadata.chunk_range(index).unwrap();
                assert_eq!(range.start, next_start);
                assert!(range.len() > 0 && range.len() <= CHUNK_SIZE);
                assert_eq!(metadata.chunk_len(index), Some(range.len() as u16));
                next_start = range.end;
            }
            assert_eq!(next_start, size as usize);
            assert_eq!(metadata.chunk_range(metadata.total_chunks), None);
        }
    }

    #[test]
    fn last_chunk_of_exact_multiple_is_full() {
        let metadata = metadata_for(720);
        assert_eq!(metadata.chunk_len(2), Some(240));
    }

    #[test]
    fn inconsistent_chunk_count_is_detected() {
        let mut metadata = metadata_for(500);
        assert!(metadata.is_consistent());
        metadata.total_chunks = 2;
        assert!(!metadata.is_consistent());
        metadata.total_size = 0;
        metadata.total_chunks = 0;
        assert!(!metadata.is_consistent());
    }
}
