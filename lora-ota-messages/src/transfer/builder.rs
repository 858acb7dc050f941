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

use crate::checksum::crc32;
use crate::custom_data_types::{TransferState, VersionLabel};
use crate::status::StatusReport;
use crate::transfer::chunk::{Chunk, ChunkHeader};
use crate::transfer::metadata::FirmwareMetadata;
use crate::{Message, PROTOCOL_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// The image has no bytes
    EmptyImage,
    /// The image needs more chunks than a chunk index can address
    ImageTooLarge,
    /// The requested chunk lies past the end of the image
    ChunkOutOfRange(u16),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::EmptyImage => f.write_str("firmware image is empty"),
            BuildError::ImageTooLarge => f.write_str("firmware image is too large"),
            BuildError::ChunkOutOfRange(index) => write!(f, "chunk {index} is out of range"),
        }
    }
}

/// A builder for creating OTA `Message`s.
pub struct OtaMessagesBuilder;

impl OtaMessagesBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn init(self, image: &[u8]) -> InitBuilder<'_> {
        InitBuilder::new(image)
    }

    pub fn chunk(self, image: &[u8]) -> ChunkBuilder<'_> {
        ChunkBuilder::new(image)
    }

    pub fn ack(self, chunk_index: u16) -> Message<'static> {
        Message::Ack(chunk_index)
    }

    pub fn nack(self, chunk_index: u16) -> Message<'static> {
        Message::Nack(chunk_index)
    }

    pub fn complete(self) -> Message<'static> {
        Message::Complete
    }

    pub fn abort(self) -> Message<'static> {
        Message::Abort
    }

    pub fn status_request(self) -> Message<'static> {
        Message::StatusRequest
    }

    pub fn status_report(self) -> StatusReportBuilder {
        StatusReportBuilder::new()
    }
}

impl Default for OtaMessagesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the Init message for an image, computing its size, chunk count and CRC.
pub struct InitBuilder<'a> {
    image: &'a [u8],
    version: VersionLabel,
    protocol_version: u8,
}

impl<'a> InitBuilder<'a> {
    fn new(image: &'a [u8]) -> Self {
        Self {
            image,
            version: VersionLabel::default(),
            protocol_version: PROTOCOL_VERSION,
        }
    }

    /// Sets the version label. Text longer than the field is truncated.
    pub fn version(mut self, version: &str) -> Self {
        self.version = VersionLabel::new(version);
        self
    }

    pub fn protocol_version(mut self, protocol_version: u8) -> Self {
        self.protocol_version = protocol_version;
        self
    }

    pub fn metadata(&self) -> Result<FirmwareMetadata, BuildError> {
        if self.image.is_empty() {
            return Err(BuildError::EmptyImage);
        }
        let total_size = u32::try_from(self.image.len()).map_err(|_| BuildError::ImageTooLarge)?;
        let total_chunks = FirmwareMetadata::chunk_count(total_size).ok_or(BuildError::ImageTooLarge)?;

        Ok(FirmwareMetadata {
            total_size,
            total_chunks,
            crc32: crc32(self.image),
            version: self.version,
            protocol_version: self.protocol_version,
        })
    }

    /// Builds the `Message::Init` message.
    pub fn build(self) -> Result<Message<'static>, BuildError> {
        self.metadata().map(Message::Init)
    }
}

/// Slices one chunk out of an image and builds its `Message::Chunk`.
///
/// The CRC field is automatically calculated from the chunk data.
pub struct ChunkBuilder<'a> {
    image: &'a [u8],
    chunk_index: u16,
}

impl<'a> ChunkBuilder<'a> {
    fn new(image: &'a [u8]) -> Self {
        Self {
            image,
            chunk_index: 0,
        }
    }

    pub fn chunk_index(mut self, index: u16) -> Self {
        self.chunk_index = index;
        self
    }

    pub fn build(self) -> Result<Message<'a>, BuildError> {
        let start = self.chunk_index as usize * crate::CHUNK_SIZE;
        if start >= self.image.len() {
            return Err(BuildError::ChunkOutOfRange(self.chunk_index));
        }
        let end = (start + crate::CHUNK_SIZE).min(self.image.len());
        let data = &self.image[start..end];

        Ok(Message::Chunk(Chunk {
            header: ChunkHeader {
                chunk_index: self.chunk_index,
                chunk_size: data.len() as u16,
                chunk_crc: crc32(data),
            },
            data,
        }))
    }
}

pub struct StatusReportBuilder {
    report: StatusReport,
}

impl StatusReportBuilder {
    fn new() -> Self {
        Self {
            report: StatusReport {
                state: TransferState::Idle,
                progress_percent: 0,
                chunk_index: 0,
            },
        }
    }

    pub fn state(mut self, state: TransferState) -> Self {
        self.report.state = state;
        self
    }

    /// Sets the progress, clamped to 100.
    pub fn progress_percent(mut self, percent: u8) -> Self {
        self.report.progress_percent = percent.min(100);
        self
    }

    pub fn chunk_index(mut self, index: u16) -> Self {
        self.report.chunk_index = index;
        self
    }

    pub fn build(self) -> Message<'static> {
        Message::StatusReport(self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_describes_the_whole_image() {
        let image = [0xA5u8; 500];
        let message = OtaMessagesBuilder::new()
            .init(&image)
            .version("2.0.0")
            .build()
            .unwrap();

        let Message::Init(metadata) = message else {
            panic!("expected Init, got {message:?}");
        };
        assert_eq!(metadata.total_size, 500);
        assert_eq!(metadata.total_chunks, 3);
        assert_eq!(metadata.crc32, crc32(&image));
        assert_eq!(metadata.version.as_str(), "2.0.0");
        assert_eq!(metadata.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn init_rejects_empty_image() {
        assert_eq!(
            OtaMessagesBuilder::new().init(&[]).build(),
            Err(BuildError::EmptyImage)
        );
    }

    #[test]
    fn chunks_carry_their_own_crc() {
        let image: [u8; 500] = core::array::from_fn(|i| i as u8);

        let last = OtaMessagesBuilder::new().chunk(&image).chunk_index(2).build().unwrap();
        let Message::Chunk(chunk) = last else {
            panic!("expected Chunk, got {last:?}");
        };
        assert_eq!(chunk.header.chunk_index, 2);
        assert_eq!(chunk.header.chunk_size, 20);
        assert_eq!(chunk.data, &image[480..]);
        assert!(chunk.is_crc_ok());
    }

    #[test]
    fn chunk_past_the_end_is_rejected() {
        let image = [0u8; 240];
        assert_eq!(
            OtaMessagesBuilder::new().chunk(&image).chunk_index(1).build(),
            Err(BuildError::ChunkOutOfRange(1))
        );
    }

    #[test]
    fn status_progress_is_clamped() {
        let message = OtaMessagesBuilder::new()
            .status_report()
            .state(TransferState::Receiving)
            .progress_percent(140)
            .chunk_index(7)
            .build();
        assert_eq!(
            message,
            Message::StatusReport(StatusReport {
                state: TransferState::Receiving,
                progress_percent: 100,
                chunk_index: 7,
            })
        );
    }
}
