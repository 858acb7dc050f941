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

use core::mem;

use log::{debug, info, trace, warn};
use lora_ota_messages::checksum::ImageChecksum;
use lora_ota_messages::transfer::builder::OtaMessagesBuilder;
use lora_ota_messages::transfer::metadata::FirmwareMetadata;
use lora_ota_messages::{
    FrameError, MAX_PACKET_SIZE, Message, MessageKind, decode_message, encode_message,
};

use crate::port::{FlashSink, Transport};
use crate::{LoRaOta, OtaError, OtaState, TargetId};

/// The transfer a device is taking part in. Role specific fields only exist
/// while that role is active.
#[derive(Debug)]
pub(crate) enum Session<'fw> {
    Idle,
    /// `begin_receiving` was called; waiting for a sender's Init
    Armed,
    Receiving(ReceivingState),
    Transmitting(TransmittingState<'fw>),
    /// All chunks written, commit in progress
    Validating,
    /// Local failure; stays here until the host calls `abort`
    Error(OtaError),
}

#[derive(Debug)]
pub(crate) struct ReceivingState {
    pub(crate) metadata: FirmwareMetadata,
    pub(crate) expected_chunk: u16,
    pub(crate) retry_count: u8,
    pub(crate) last_activity_ms: u64,
    pub(crate) image_checksum: ImageChecksum,
}

impl ReceivingState {
    pub(crate) fn new(metadata: FirmwareMetadata, now_ms: u64) -> Self {
        Self {
            metadata,
            expected_chunk: 0,
            retry_count: 0,
            last_activity_ms: now_ms,
            image_checksum: ImageChecksum::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxPhase {
    /// Init sent, waiting for the receiver's Ack(0)
    Announcing,
    /// Chunk `current_chunk` sent, waiting for its Ack
    Streaming,
}

#[derive(Debug)]
pub(crate) struct TransmittingState<'fw> {
    pub(crate) image: &'fw [u8],
    pub(crate) metadata: FirmwareMetadata,
    pub(crate) phase: TxPhase,
    pub(crate) current_chunk: u16,
    pub(crate) retry_count: u8,
    pub(crate) last_activity_ms: u64,
    pub(crate) target: TargetId,
    /// Extra Ack(0)s a receiver may still send for repeated Inits
    pub(crate) pending_init_acks: u8,
}

impl Session<'_> {
    pub(crate) fn public_state(&self) -> OtaState {
        match self {
            Session::Idle => OtaState::Idle,
            Session::Armed | Session::Receiving(_) => OtaState::Receiving,
            Session::Transmitting(_) => OtaState::Transmitting,
            Session::Validating => OtaState::Validating,
            Session::Error(_) => OtaState::Error,
        }
    }

    pub(crate) fn progress_percent(&self) -> u8 {
        match self {
            Session::Receiving(rx) => percent(rx.expected_chunk, rx.metadata.total_chunks),
            Session::Transmitting(tx) => match tx.phase {
                TxPhase::Announcing => 0,
                TxPhase::Streaming => percent(tx.current_chunk, tx.metadata.total_chunks),
            },
            Session::Validating => 100,
            Session::Idle | Session::Armed | Session::Error(_) => 0,
        }
    }

    /// Expected chunk when receiving, chunk awaiting acknowledgment when sending.
    pub(crate) fn chunk_cursor(&self) -> u16 {
        match self {
            Session::Receiving(rx) => rx.expected_chunk,
            Session::Transmitting(tx) => tx.current_chunk,
            _ => 0,
        }
    }

    pub(crate) fn metadata(&self) -> Option<&FirmwareMetadata> {
        match self {
            Session::Receiving(rx) => Some(&rx.metadata),
            Session::Transmitting(tx) => Some(&tx.metadata),
            _ => None,
        }
    }
}

fn percent(done: u16, total: u16) -> u8 {
    if total == 0 {
        return 0;
    }
    (u32::from(done) * 100 / u32::from(total)).min(100) as u8
}

/// The transport refused a packet. Details are logged where it happens.
pub(crate) struct SendFailed;

impl<'fw, T: Transport, F: FlashSink> LoRaOta<'fw, T, F> {
    pub(crate) fn send(&mut self, msg: &Message<'_>) -> Result<(), SendFailed> {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let len = encode_message(msg, &mut buffer).map_err(|e| {
            warn!("LoRaOTA: Cannot encode {:?}: {}", msg.kind(), e);
            SendFailed
        })?;

        trace!("LoRaOTA: Sending {:?} ({} bytes)", msg.kind(), len);
        self.transport.send_packet(&buffer[..len]).map_err(|e| {
            warn!("LoRaOTA: Transport send of {:?} failed: {:?}", msg.kind(), e);
            SendFailed
        })
    }

    /// Sends a message whose loss the protocol recovers from on its own.
    pub(crate) fn send_best_effort(&mut self, msg: &Message<'_>) {
        let _ = self.send(msg);
    }

    pub(crate) fn process_packet(&mut self, packet: &[u8], now_ms: u64) {
        let message = match decode_message(packet) {
            Ok(message) => message,
            Err(e) => {
                self.on_malformed(e);
                return;
            }
        };
        trace!("LoRaOTA: Received {:?}", message.kind());

        match message {
            Message::Init(metadata) => self.on_init(metadata, now_ms),
            Message::Chunk(chunk) => self.on_chunk(chunk, now_ms),
            Message::Ack(index) => self.on_ack(index, now_ms),
            Message::Nack(index) => self.on_nack(index, now_ms),
            Message::Complete => self.on_complete(),
            Message::Abort => self.on_peer_abort(),
            Message::StatusRequest => self.on_status_request(),
            Message::StatusReport(report) => info!(
                "LoRaOTA: Peer status {:?}, {}% at chunk {}",
                report.state, report.progress_percent, report.chunk_index
            ),
        }
    }

    fn on_malformed(&mut self, err: FrameError) {
        warn!("LoRaOTA: {}", OtaError::from(err));
        if err.kind() == Some(MessageKind::Chunk) {
            if let Session::Receiving(rx) = &self.session {
                let expected = rx.expected_chunk;
                self.send_best_effort(&OtaMessagesBuilder::new().nack(expected));
            }
        }
    }

    fn on_status_request(&mut self) {
        let report = OtaMessagesBuilder::new()
            .status_report()
            .state(self.session.public_state())
            .progress_percent(self.session.progress_percent())
            .chunk_index(self.session.chunk_cursor())
            .build();
        self.send_best_effort(&report);
    }

    fn on_peer_abort(&mut self) {
        self.session = match mem::replace(&mut self.session, Session::Idle) {
            Session::Receiving(_) | Session::Validating => {
                warn!("LoRaOTA: Update aborted by sender");
                self.flash.discard();
                self.last_error = Some(OtaError::AbortedByPeer);
                Session::Idle
            }
            Session::Transmitting(_) => {
                warn!("LoRaOTA: Update aborted by receiver");
                self.last_error = Some(OtaError::AbortedByPeer);
                Session::Idle
            }
            other => {
                debug!("LoRaOTA: Ignoring Abort, no transfer in progress");
                other
            }
        };
    }

    /// Ends the active session because of `cause`: rolls back flash when
    /// receiving, tells the peer, and records the error.
    pub(crate) fn abandon(&mut self, receiving: bool, cause: OtaError) -> Session<'fw> {
        warn!("LoRaOTA: Aborting update: {}", cause);
        if receiving {
            self.flash.discard();
        }
        self.send_best_effort(&OtaMessagesBuilder::new().abort());
        self.last_error = Some(cause);

        if cause.leaves_error_state() {
            Session::Error(cause)
        } else {
            Session::Idle
        }
    }

    /// Retries or gives up on a peer that has gone quiet.
    pub(crate) fn check_timeouts(&mut self, now_ms: u64) {
        let timeout_ms = self.config.timeout_ms;
        let max_retries = self.config.max_retries;

        self.session = match mem::replace(&mut self.session, Session::Idle) {
            Session::Receiving(mut rx) if now_ms.saturating_sub(rx.last_activity_ms) > timeout_ms => {
                if rx.retry_count < max_retries {
                    warn!(
                        "LoRaOTA: {}, requesting retry",
                        OtaError::Timeout { chunk: rx.expected_chunk }
                    );
                    self.send_best_effort(&OtaMessagesBuilder::new().nack(rx.expected_chunk));
                    rx.retry_count += 1;
                    rx.last_activity_ms = now_ms;
                    Session::Receiving(rx)
                } else {
                    self.abandon(true, OtaError::SenderTimeout)
                }
            }
            Session::Transmitting(mut tx) if now_ms.saturating_sub(tx.last_activity_ms) > timeout_ms => {
                if tx.retry_count < max_retries {
                    warn!(
                        "LoRaOTA: {}, resending",
                        OtaError::Timeout { chunk: tx.current_chunk }
                    );
                    let chunk = tx.current_chunk;
                    self.resend(&mut tx, chunk);
                    tx.retry_count += 1;
                    tx.last_activity_ms = now_ms;
                    Session::Transmitting(tx)
                } else {
                    self.abandon(false, OtaError::ReceiverTimeout)
                }
            }
            other => other,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_uses_integer_division() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(65535, 65535), 100);
    }
}
