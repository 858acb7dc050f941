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

pub mod builder;
pub mod chunk;
pub mod metadata;

/// Maximum firmware payload carried by a single Chunk message.
pub const CHUNK_SIZE: usize = 240;

/// Encoded size of a `ChunkHeader`: index, size and CRC.
pub const CHUNK_HEADER_SIZE: usize = 8;

/// Encoded size of `FirmwareMetadata`.
pub const METADATA_SIZE: usize = 27;

/// Width of the version label field, including the terminating NUL.
pub const VERSION_FIELD_SIZE: usize = 16;
