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
use crc::{CRC_32_ISO_HDLC, Crc, Digest};

/// CRC-32/ISO-HDLC (reflected, init 0xFFFFFFFF, final complement). The lookup
/// table is generated at compile time.
pub static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Calculates the CRC32 checksum of the given data using CRC_32_ISO_HDLC.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Running checksum over an image that arrives in pieces.
pub struct ImageChecksum {
    digest: Digest<'static, u32>,
    bytes_seen: u32,
}

impl ImageChecksum {
    pub fn new() -> Self {
        Self {
            digest: CRC32.digest(),
            bytes_seen: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
        self.bytes_seen = self.bytes_seen.saturating_add(data.len() as u32);
    }

    pub fn bytes_seen(&self) -> u32 {
        self.bytes_seen
    }

    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for ImageChecksum {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ImageChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageChecksum")
            .field("bytes_seen", &self.bytes_seen)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_standard_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_input() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn single_byte_corruption_changes_crc() {
        let data: [u8; 240] = core::array::from_fn(|i| (i * 7) as u8);
        let good = crc32(&data);
        for i in 0..data.len() {
            let mut corrupted = data;
            corrupted[i] ^= 0x01;
            assert_ne!(crc32(&corrupted), good, "corruption at byte {i} went unnoticed");
        }
    }

    #[test]
    fn running_checksum_matches_one_shot() {
        let data: [u8; 700] = core::array::from_fn(|i| (i % 251) as u8);
        let mut running = ImageChecksum::new();
        for piece in data.chunks(240) {
            running.update(piece);
        }
        assert_eq!(running.bytes_seen(), 700);
        assert_eq!(running.finalize(), crc32(&data));
    }
}
