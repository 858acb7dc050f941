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

use lora_ota_messages::FrameError;

/// Broad failure classes. Everything up to and including `LinkTimeout` is handled
/// inside the state machine; the rest end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A host call that is not valid right now
    Usage,
    /// Malformed or undersized packet
    Format,
    /// Chunk or image checksum mismatch
    Integrity,
    /// Message that does not fit the current session
    ProtocolViolation,
    /// Flash sink failure
    Resource,
    /// Transport failure
    Link,
    /// No peer activity within the timeout window
    LinkTimeout,
    /// Retry ceiling reached
    RetryExhausted,
    /// Session cancelled by the host or the peer
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    NotInitialized,
    AlreadyInProgress,
    InvalidFirmware,
    FirmwareTooLarge,
    TargetIdTooLong,
    TransportInitFailed,
    InitSendFailed,
    ChunkSendFailed,
    Malformed(FrameError),
    ChunkSizeMismatch { chunk: u16, expected: u16, received: u16 },
    ChunkCrcMismatch { chunk: u16 },
    ImageCrcMismatch { expected: u32, actual: u32 },
    OutOfSequence { expected: u16, received: u16 },
    UnexpectedAck { expected: u16, received: u16 },
    UnsupportedProtocol(u8),
    FlashPrepareFailed,
    FlashWriteFailed,
    FlashCommitFailed,
    Timeout { chunk: u16 },
    SenderTimeout,
    ReceiverTimeout,
    TooManyRetries,
    AbortedByPeer,
    AbortedByHost,
}

impl OtaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OtaError::NotInitialized
            | OtaError::AlreadyInProgress
            | OtaError::InvalidFirmware
            | OtaError::FirmwareTooLarge
            | OtaError::TargetIdTooLong => ErrorKind::Usage,
            OtaError::TransportInitFailed | OtaError::InitSendFailed | OtaError::ChunkSendFailed => {
                ErrorKind::Link
            }
            OtaError::Malformed(_) | OtaError::ChunkSizeMismatch { .. } => ErrorKind::Format,
            OtaError::ChunkCrcMismatch { .. } | OtaError::ImageCrcMismatch { .. } => ErrorKind::Integrity,
            OtaError::OutOfSequence { .. }
            | OtaError::UnexpectedAck { .. }
            | OtaError::UnsupportedProtocol(_) => ErrorKind::ProtocolViolation,
            OtaError::FlashPrepareFailed | OtaError::FlashWriteFailed | OtaError::FlashCommitFailed => {
                ErrorKind::Resource
            }
            OtaError::Timeout { .. } => ErrorKind::LinkTimeout,
            OtaError::SenderTimeout | OtaError::ReceiverTimeout | OtaError::TooManyRetries => {
                ErrorKind::RetryExhausted
            }
            OtaError::AbortedByPeer | OtaError::AbortedByHost => ErrorKind::Aborted,
        }
    }

    /// True for conditions the state machine absorbs with a NACK, a resend or by
    /// ignoring the packet.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Format | ErrorKind::ProtocolViolation | ErrorKind::LinkTimeout
        ) || matches!(self, OtaError::ChunkCrcMismatch { .. })
    }

    /// Whether a session that fails with this error is left in the Error state
    /// rather than reset to Idle. Only local faults on the receiving side qualify.
    pub(crate) fn leaves_error_state(&self) -> bool {
        self.kind() == ErrorKind::Resource || matches!(self, OtaError::ImageCrcMismatch { .. })
    }

    pub fn message(&self) -> &'static str {
        match self {
            OtaError::NotInitialized => "LoRa OTA not initialized",
            OtaError::AlreadyInProgress => "Update already in progress",
            OtaError::InvalidFirmware => "Invalid firmware data",
            OtaError::FirmwareTooLarge => "Firmware image too large",
            OtaError::TargetIdTooLong => "Target device id too long",
            OtaError::TransportInitFailed => "Transport initialization failed",
            OtaError::InitSendFailed => "Failed to send init message",
            OtaError::ChunkSendFailed => "Failed to send chunk",
            OtaError::Malformed(_) => "Malformed packet",
            OtaError::ChunkSizeMismatch { .. } => "Chunk size mismatch",
            OtaError::ChunkCrcMismatch { .. } => "Chunk CRC mismatch",
            OtaError::ImageCrcMismatch { .. } => "Firmware image CRC mismatch",
            OtaError::OutOfSequence { .. } => "Chunk out of sequence",
            OtaError::UnexpectedAck { .. } => "ACK for wrong chunk",
            OtaError::UnsupportedProtocol(_) => "Unsupported protocol version",
            OtaError::FlashPrepareFailed => "Failed to begin update",
            OtaError::FlashWriteFailed => "Flash write failed",
            OtaError::FlashCommitFailed => "Update finalization failed",
            OtaError::Timeout { .. } => "Timeout waiting for peer",
            OtaError::SenderTimeout => "Timeout: No response from sender",
            OtaError::ReceiverTimeout => "Timeout: No acknowledgment from receiver",
            OtaError::TooManyRetries => "Too many retries",
            OtaError::AbortedByPeer => "Update aborted by peer",
            OtaError::AbortedByHost => "Update aborted by host",
        }
    }
}

impl From<FrameError> for OtaError {
    fn from(err: FrameError) -> Self {
        OtaError::Malformed(err)
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())?;
        match self {
            OtaError::Malformed(e) => write!(f, ": {e}"),
            OtaError::ChunkSizeMismatch { chunk, expected, received } => {
                write!(f, " (chunk {chunk}: expected {expected} bytes, got {received})")
            }
            OtaError::ChunkCrcMismatch { chunk } => write!(f, " (chunk {chunk})"),
            OtaError::ImageCrcMismatch { expected, actual } => {
                write!(f, " (expected 0x{expected:08X}, got 0x{actual:08X})")
            }
            OtaError::OutOfSequence { expected, received } | OtaError::UnexpectedAck { expected, received } => {
                write!(f, " (expected {expected}, got {received})")
            }
            OtaError::UnsupportedProtocol(version) => write!(f, " ({version})"),
            OtaError::Timeout { chunk } => write!(f, " (chunk {chunk})"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_not_recoverable() {
        assert!(OtaError::ChunkCrcMismatch { chunk: 1 }.is_recoverable());
        assert!(OtaError::Timeout { chunk: 0 }.is_recoverable());
        assert!(OtaError::Malformed(FrameError::Empty).is_recoverable());
        assert!(!OtaError::ImageCrcMismatch { expected: 1, actual: 2 }.is_recoverable());
        assert!(!OtaError::TooManyRetries.is_recoverable());
        assert!(!OtaError::FlashWriteFailed.is_recoverable());
    }

    #[test]
    fn only_local_faults_leave_error_state() {
        assert!(OtaError::FlashWriteFailed.leaves_error_state());
        assert!(OtaError::FlashCommitFailed.leaves_error_state());
        assert!(OtaError::ImageCrcMismatch { expected: 1, actual: 2 }.leaves_error_state());
        assert!(!OtaError::SenderTimeout.leaves_error_state());
        assert!(!OtaError::AbortedByHost.leaves_error_state());
    }

    #[test]
    fn display_adds_detail_to_message() {
        let text = format!("{}", OtaError::OutOfSequence { expected: 3, received: 5 });
        assert_eq!(text, "Chunk out of sequence (expected 3, got 5)");
        assert_eq!(format!("{}", OtaError::TooManyRetries), "Too many retries");
    }
}
