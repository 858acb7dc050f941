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

use crate::checksum::crc32;
use crate::transfer::CHUNK_HEADER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_index: u16,
    pub chunk_size: u16,
    pub chunk_crc: u32,
}

impl ChunkHeader {
    pub(crate) fn write_to(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.chunk_index.to_le_bytes());
        out[2..4].copy_from_slice(&self.chunk_size.to_le_bytes());
        out[4..CHUNK_HEADER_SIZE].copy_from_slice(&self.chunk_crc.to_le_bytes());
    }

    /// Reads a header from `bytes`, which must hold at least `CHUNK_HEADER_SIZE` bytes.
    pub(crate) fn read_from(bytes: &[u8]) -> Self {
        Self {
            chunk_index: u16::from_le_bytes([bytes[0], bytes[1]]),
            chunk_size: u16::from_le_bytes([bytes[2], bytes[3]]),
            chunk_crc: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

/// A chunk header and the payload it describes. The payload borrows from the
/// packet buffer it was decoded from, or from the image it was sliced out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub header: ChunkHeader,
    pub data: &'a [u8],
}

impl Chunk<'_> {
    pub fn is_crc_ok(&self) -> bool {
        crc32(self.data) == self.header.chunk_crc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_check_detects_corrupted_payload() {
        let payload = [0x10u8, 0x20, 0x30, 0x40];
        let header = ChunkHeader {
            chunk_index: 3,
            chunk_size: payload.len() as u16,
            chunk_crc: crc32(&payload),
        };
        assert!(Chunk { header, data: &payload }.is_crc_ok());

        let corrupted = [0x10u8, 0x20, 0x31, 0x40];
        assert!(!Chunk { header, data: &corrupted }.is_crc_ok());
    }

    #[test]
    fn header_layout_is_little_endian() {
        let header = ChunkHeader {
            chunk_index: 0x0102,
            chunk_size: 0x00F0,
            chunk_crc: 0xAABBCCDD,
        };
        let mut out = [0u8; CHUNK_HEADER_SIZE];
        header.write_to(&mut out);
        assert_eq!(out, [0x02, 0x01, 0xF0, 0x00, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(ChunkHeader::read_from(&out), header);
    }
}
