#![no_std]
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

//! Wire format of the LoRa OTA firmware delivery protocol.
//!
//! Every packet is a one byte kind tag followed by a fixed layout, little-endian
//! payload with no padding. The largest packet is a full Chunk message of
//! `MAX_PACKET_SIZE` bytes.

use core::fmt;

use crate::status::{STATUS_REPORT_SIZE, StatusReport};
use crate::transfer::chunk::{Chunk, ChunkHeader};
use crate::transfer::metadata::FirmwareMetadata;

pub mod checksum;
pub mod custom_data_types;
pub mod status;
pub mod transfer;

pub use transfer::{CHUNK_HEADER_SIZE, CHUNK_SIZE, METADATA_SIZE, VERSION_FIELD_SIZE};

/// Wire format revision carried in the Init message.
pub const PROTOCOL_VERSION: u8 = 1;

/// Tag byte plus a chunk header plus a full chunk.
pub const MAX_PACKET_SIZE: usize = 1 + CHUNK_HEADER_SIZE + CHUNK_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Init = 0x01,
    Chunk = 0x02,
    Ack = 0x03,
    Nack = 0x04,
    Complete = 0x05,
    Abort = 0x06,
    Status = 0x07,
}

impl TryFrom<u8> for MessageKind {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x01 => Ok(MessageKind::Init),
            0x02 => Ok(MessageKind::Chunk),
            0x03 => Ok(MessageKind::Ack),
            0x04 => Ok(MessageKind::Nack),
            0x05 => Ok(MessageKind::Complete),
            0x06 => Ok(MessageKind::Abort),
            0x07 => Ok(MessageKind::Status),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message<'a> {
    Init(FirmwareMetadata),
    Chunk(Chunk<'a>),
    Ack(u16),
    Nack(u16),
    Complete,
    Abort,
    StatusRequest,
    StatusReport(StatusReport),
}

impl Message<'_> {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Init(_) => MessageKind::Init,
            Message::Chunk(_) => MessageKind::Chunk,
            Message::Ack(_) => MessageKind::Ack,
            Message::Nack(_) => MessageKind::Nack,
            Message::Complete => MessageKind::Complete,
            Message::Abort => MessageKind::Abort,
            Message::StatusRequest | Message::StatusReport(_) => MessageKind::Status,
        }
    }

    /// Number of bytes `encode_message` writes for this message, tag included.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Message::Init(_) => METADATA_SIZE,
            Message::Chunk(chunk) => CHUNK_HEADER_SIZE + chunk.data.len(),
            Message::Ack(_) | Message::Nack(_) => 2,
            Message::Complete | Message::Abort | Message::StatusRequest => 0,
            Message::StatusReport(_) => STATUS_REPORT_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer is too small to hold the encoded message, value is the needed length
    BufferTooSmall(usize),
    /// The packet has no bytes at all
    Empty,
    /// The tag byte is not a known message kind
    UnknownKind(u8),
    /// The packet is shorter than its kind requires
    Truncated { kind: MessageKind, expected: usize },
    /// A field holds a value the protocol does not allow
    InvalidField(MessageKind),
}

impl FrameError {
    /// The message kind this error relates to, when the tag byte was readable.
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            FrameError::Truncated { kind, .. } | FrameError::InvalidField(kind) => Some(*kind),
            FrameError::BufferTooSmall(_) | FrameError::Empty | FrameError::UnknownKind(_) => None,
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::BufferTooSmall(needed) => write!(f, "buffer too small, {needed} bytes needed"),
            FrameError::Empty => f.write_str("empty packet"),
            FrameError::UnknownKind(tag) => write!(f, "unknown message type 0x{tag:02X}"),
            FrameError::Truncated { kind, expected } => {
                write!(f, "{kind:?} packet truncated, {expected} bytes expected")
            }
            FrameError::InvalidField(kind) => write!(f, "invalid field in {kind:?} packet"),
        }
    }
}

/// Encode a message into `buffer` ready to hand to the radio.
///
/// Returns the number of bytes written on success, or a FrameError on failure.
///
/// # Errors
///
/// - `BufferTooSmall`: if the buffer cannot hold the encoded message
/// - `InvalidField`: if a chunk payload is empty, longer than `CHUNK_SIZE`, or
///   disagrees with the size in its header
pub fn encode_message(msg: &Message<'_>, buffer: &mut [u8]) -> Result<usize, FrameError> {
    if let Message::Chunk(chunk) = msg {
        if chunk.data.is_empty()
            || chunk.data.len() > CHUNK_SIZE
            || chunk.header.chunk_size as usize != chunk.data.len()
        {
            return Err(FrameError::InvalidField(MessageKind::Chunk));
        }
    }

    let encoded_len = msg.encoded_len();
    if buffer.len() < encoded_len {
        return Err(FrameError::BufferTooSmall(encoded_len));
    }

    buffer[0] = msg.kind() as u8;
    let payload = &mut buffer[1..encoded_len];
    match msg {
        Message::Init(metadata) => metadata.write_to(payload),
        Message::Chunk(chunk) => {
            chunk.header.write_to(&mut payload[..CHUNK_HEADER_SIZE]);
            payload[CHUNK_HEADER_SIZE..].copy_from_slice(chunk.data);
        }
        Message::Ack(index) | Message::Nack(index) => payload.copy_from_slice(&index.to_le_bytes()),
        Message::Complete | Message::Abort | Message::StatusRequest => {}
        Message::StatusReport(report) => report.write_to(payload),
    }

    Ok(encoded_len)
}

/// Decode a packet received from the radio.
///
/// Lengths are checked per kind before any field is read. A chunk payload length
/// comes from its header; bytes after the declared payload are ignored.
pub fn decode_message(packet: &[u8]) -> Result<Message<'_>, FrameError> {
    let (&tag, payload) = packet.split_first().ok_or(FrameError::Empty)?;
    let kind = MessageKind::try_from(tag).map_err(FrameError::UnknownKind)?;

    match kind {
        MessageKind::Init => {
            require_len(kind, payload, METADATA_SIZE)?;
            let metadata = FirmwareMetadata::read_from(payload);
            if !metadata.is_consistent() {
                return Err(FrameError::InvalidField(kind));
            }
            Ok(Message::Init(metadata))
        }
        MessageKind::Chunk => {
            require_len(kind, payload, CHUNK_HEADER_SIZE)?;
            let header = ChunkHeader::read_from(payload);
            let chunk_size = header.chunk_size as usize;
            if chunk_size == 0 || chunk_size > CHUNK_SIZE {
                return Err(FrameError::InvalidField(kind));
            }
            require_len(kind, payload, CHUNK_HEADER_SIZE + chunk_size)?;
            Ok(Message::Chunk(Chunk {
                header,
                data: &payload[CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + chunk_size],
            }))
        }
        MessageKind::Ack | MessageKind::Nack => {
            require_len(kind, payload, 2)?;
            let index = u16::from_le_bytes([payload[0], payload[1]]);
            Ok(if kind == MessageKind::Ack {
                Message::Ack(index)
            } else {
                Message::Nack(index)
            })
        }
        MessageKind::Complete => Ok(Message::Complete),
        MessageKind::Abort => Ok(Message::Abort),
        MessageKind::Status => {
            if payload.is_empty() {
                return Ok(Message::StatusRequest);
            }
            require_len(kind, payload, STATUS_REPORT_SIZE)?;
            StatusReport::read_from(payload)
                .map(Message::StatusReport)
                .map_err(|_| FrameError::InvalidField(kind))
        }
    }
}

fn require_len(kind: MessageKind, payload: &[u8], needed: usize) -> Result<(), FrameError> {
    if payload.len() < needed {
        return Err(FrameError::Truncated {
            kind,
            expected: needed + 1,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::crc32;
    use crate::custom_data_types::{TransferState, VersionLabel};
    use crate::transfer::builder::OtaMessagesBuilder;

    fn encode<'b>(msg: &Message<'_>, buffer: &'b mut [u8; MAX_PACKET_SIZE]) -> &'b [u8] {
        let len = encode_message(msg, buffer).unwrap();
        &buffer[..len]
    }

    #[test]
    fn control_messages_are_bit_exact() {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        assert_eq!(encode(&Message::Ack(0x0102), &mut buffer), &[0x03, 0x02, 0x01]);
        assert_eq!(encode(&Message::Nack(7), &mut buffer), &[0x04, 0x07, 0x00]);
        assert_eq!(encode(&Message::Complete, &mut buffer), &[0x05]);
        assert_eq!(encode(&Message::Abort, &mut buffer), &[0x06]);
        assert_eq!(encode(&Message::StatusRequest, &mut buffer), &[0x07]);
    }

    #[test]
    fn init_layout_is_packed() {
        let metadata = FirmwareMetadata {
            total_size: 16,
            total_chunks: 1,
            crc32: 0x1122_3344,
            version: VersionLabel::new("2.0.0"),
            protocol_version: PROTOCOL_VERSION,
        };
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let bytes = encode(&Message::Init(metadata), &mut buffer);

        assert_eq!(bytes.len(), 1 + METADATA_SIZE);
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..5], &[16, 0, 0, 0]);
        assert_eq!(&bytes[5..7], &[1, 0]);
        assert_eq!(&bytes[7..11], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(&bytes[11..17], b"2.0.0\0");
        assert_eq!(bytes[27], PROTOCOL_VERSION);
        assert_eq!(decode_message(bytes), Ok(Message::Init(metadata)));
    }

    #[test]
    fn full_chunk_fills_max_packet() {
        let image = [0x5Au8; CHUNK_SIZE];
        let msg = OtaMessagesBuilder::new().chunk(&image).build().unwrap();
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let bytes = encode(&msg, &mut buffer);

        assert_eq!(bytes.len(), MAX_PACKET_SIZE);
        assert_eq!(&bytes[1..5], &[0, 0, 240, 0]);
        assert_eq!(&bytes[5..9], &crc32(&image).to_le_bytes());
        assert_eq!(decode_message(bytes), Ok(msg));
    }

    #[test]
    fn chunk_length_comes_from_header() {
        let image = [1u8, 2, 3, 4, 5];
        let msg = OtaMessagesBuilder::new().chunk(&image).build().unwrap();
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let len = encode_message(&msg, &mut buffer).unwrap();

        // radio padding after the payload is ignored
        let Ok(Message::Chunk(chunk)) = decode_message(&buffer[..len + 4]) else {
            panic!("chunk did not decode");
        };
        assert_eq!(chunk.data, &image);

        // a payload shorter than the header claims is truncated
        assert_eq!(
            decode_message(&buffer[..len - 1]),
            Err(FrameError::Truncated {
                kind: MessageKind::Chunk,
                expected: len,
            })
        );
    }

    #[test]
    fn undersized_packets_are_rejected_per_kind() {
        assert_eq!(decode_message(&[]), Err(FrameError::Empty));
        assert_eq!(
            decode_message(&[0x03, 0x01]),
            Err(FrameError::Truncated { kind: MessageKind::Ack, expected: 3 })
        );
        assert_eq!(
            decode_message(&[0x02, 0, 0, 4]).unwrap_err().kind(),
            Some(MessageKind::Chunk)
        );
        assert_eq!(
            decode_message(&[0x01; 20]).unwrap_err(),
            FrameError::Truncated { kind: MessageKind::Init, expected: 1 + METADATA_SIZE }
        );
        assert_eq!(
            decode_message(&[0x07, 2, 50]).unwrap_err().kind(),
            Some(MessageKind::Status)
        );
    }

    #[test]
    fn invalid_fields_are_rejected() {
        assert_eq!(decode_message(&[0x09]), Err(FrameError::UnknownKind(0x09)));
        assert_eq!(decode_message(&[0x00, 1, 2]), Err(FrameError::UnknownKind(0x00)));

        // zero and oversized chunk lengths
        let mut packet = [0u8; MAX_PACKET_SIZE + 8];
        packet[0] = 0x02;
        assert_eq!(decode_message(&packet), Err(FrameError::InvalidField(MessageKind::Chunk)));
        packet[3..5].copy_from_slice(&241u16.to_le_bytes());
        assert_eq!(decode_message(&packet), Err(FrameError::InvalidField(MessageKind::Chunk)));

        // metadata whose chunk count disagrees with its size
        let mut init = [0u8; 1 + METADATA_SIZE];
        init[0] = 0x01;
        init[1..5].copy_from_slice(&500u32.to_le_bytes());
        init[5..7].copy_from_slice(&2u16.to_le_bytes());
        assert_eq!(decode_message(&init), Err(FrameError::InvalidField(MessageKind::Init)));

        assert_eq!(
            decode_message(&[0x07, 9, 0, 0, 0]),
            Err(FrameError::InvalidField(MessageKind::Status))
        );
    }

    #[test]
    fn status_report_decodes() {
        let msg = OtaMessagesBuilder::new()
            .status_report()
            .state(TransferState::Transmitting)
            .progress_percent(42)
            .chunk_index(300)
            .build();
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let bytes = encode(&msg, &mut buffer);
        assert_eq!(bytes, &[0x07, 2, 42, 0x2C, 0x01]);
        assert_eq!(decode_message(bytes), Ok(msg));
    }

    #[test]
    fn encoding_checks_buffer_and_chunk_shape() {
        let mut small = [0u8; 2];
        assert_eq!(encode_message(&Message::Ack(1), &mut small), Err(FrameError::BufferTooSmall(3)));

        let data = [0u8; 4];
        let mismatched = Message::Chunk(Chunk {
            header: ChunkHeader { chunk_index: 0, chunk_size: 5, chunk_crc: crc32(&data) },
            data: &data,
        });
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        assert_eq!(
            encode_message(&mismatched, &mut buffer),
            Err(FrameError::InvalidField(MessageKind::Chunk))
        );
    }
}
