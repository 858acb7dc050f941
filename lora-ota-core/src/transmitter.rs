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

//! Sending side: announces the image, then hands out one chunk at a time as
//! each is acknowledged.

use core::mem;

use log::{debug, info, trace, warn};
use lora_ota_messages::Message;
use lora_ota_messages::transfer::builder::{BuildError, OtaMessagesBuilder};

use crate::port::{FlashSink, Transport};
use crate::session::{SendFailed, Session, TransmittingState, TxPhase};
use crate::{LoRaOta, OtaError, TargetId};

impl<'fw, T: Transport, F: FlashSink> LoRaOta<'fw, T, F> {
    pub(crate) fn start_transmission(
        &mut self,
        image: &'fw [u8],
        version: &str,
        target_id: &str,
        now_ms: u64,
    ) -> Result<(), OtaError> {
        let metadata = OtaMessagesBuilder::new()
            .init(image)
            .version(version)
            .metadata()
            .map_err(|e| match e {
                BuildError::EmptyImage => OtaError::InvalidFirmware,
                BuildError::ImageTooLarge | BuildError::ChunkOutOfRange(_) => OtaError::FirmwareTooLarge,
            })?;

        let mut target = TargetId::new();
        target.push_str(target_id).map_err(|_| OtaError::TargetIdTooLong)?;

        info!(
            "LoRaOTA: Starting firmware transmission ({} bytes, {} chunks) to {}",
            metadata.total_size,
            metadata.total_chunks,
            if target.is_empty() { "all devices" } else { target.as_str() }
        );

        self.last_error = None;
        if self.send(&Message::Init(metadata)).is_err() {
            self.session = self.abandon(false, OtaError::InitSendFailed);
            return Err(OtaError::InitSendFailed);
        }

        self.session = Session::Transmitting(TransmittingState {
            image,
            metadata,
            phase: TxPhase::Announcing,
            current_chunk: 0,
            retry_count: 0,
            last_activity_ms: now_ms,
            target,
            pending_init_acks: 0,
        });
        Ok(())
    }

    pub(crate) fn on_ack(&mut self, index: u16, now_ms: u64) {
        self.session = match mem::replace(&mut self.session, Session::Idle) {
            Session::Transmitting(mut tx)
                if index == 0
                    && tx.phase == TxPhase::Streaming
                    && tx.current_chunk == 0
                    && tx.pending_init_acks > 0 =>
            {
                debug!("LoRaOTA: Ignoring ACK 0 for a repeated INIT");
                tx.pending_init_acks -= 1;
                Session::Transmitting(tx)
            }
            Session::Transmitting(tx) => self.acknowledged(tx, index, now_ms),
            other => {
                trace!("LoRaOTA: Ignoring ACK {}, not transmitting", index);
                other
            }
        };
    }

    fn acknowledged(&mut self, mut tx: TransmittingState<'fw>, index: u16, now_ms: u64) -> Session<'fw> {
        match tx.phase {
            TxPhase::Announcing => {
                if index != 0 {
                    warn!("LoRaOTA: {}", OtaError::UnexpectedAck { expected: 0, received: index });
                    return Session::Transmitting(tx);
                }
                info!("LoRaOTA: Receiver accepted the update");
                tx.phase = TxPhase::Streaming;
            }
            TxPhase::Streaming => {
                if index != tx.current_chunk {
                    warn!(
                        "LoRaOTA: {}",
                        OtaError::UnexpectedAck { expected: tx.current_chunk, received: index }
                    );
                    return Session::Transmitting(tx);
                }
                debug!("LoRaOTA: Chunk {} acknowledged", index);
                tx.current_chunk += 1;
                if tx.current_chunk >= tx.metadata.total_chunks {
                    return self.finish_transmission();
                }
            }
        }

        tx.retry_count = 0;
        if self.send_chunk(&tx, tx.current_chunk).is_err() {
            return self.abandon(false, OtaError::ChunkSendFailed);
        }
        tx.last_activity_ms = now_ms;
        Session::Transmitting(tx)
    }

    pub(crate) fn on_nack(&mut self, index: u16, now_ms: u64) {
        self.session = match mem::replace(&mut self.session, Session::Idle) {
            // the receiver already holds the chunk in flight
            Session::Transmitting(tx)
                if tx.phase == TxPhase::Streaming
                    && u32::from(index) == u32::from(tx.current_chunk) + 1 =>
            {
                debug!("LoRaOTA: NACK {} acknowledges chunk {}", index, tx.current_chunk);
                let chunk = tx.current_chunk;
                self.acknowledged(tx, chunk, now_ms)
            }
            Session::Transmitting(mut tx) => {
                warn!("LoRaOTA: Chunk {} NACK received, retrying", index);
                tx.retry_count = tx.retry_count.saturating_add(1);
                if tx.retry_count >= self.config.max_retries {
                    self.abandon(false, OtaError::TooManyRetries)
                } else {
                    self.resend(&mut tx, index);
                    tx.last_activity_ms = now_ms;
                    Session::Transmitting(tx)
                }
            }
            other => {
                trace!("LoRaOTA: Ignoring NACK {}, not transmitting", index);
                other
            }
        };
    }

    /// The receiver sends Complete after committing. If that arrives while we
    /// still wait for the last Ack, the Ack was lost.
    pub(crate) fn on_complete(&mut self) {
        self.session = match mem::replace(&mut self.session, Session::Idle) {
            Session::Transmitting(tx)
                if tx.phase == TxPhase::Streaming
                    && u32::from(tx.current_chunk) + 1 == u32::from(tx.metadata.total_chunks) =>
            {
                info!("LoRaOTA: Receiver reported completion");
                self.finish_transmission()
            }
            other => {
                info!("LoRaOTA: Update complete message received");
                other
            }
        };
    }

    fn finish_transmission(&mut self) -> Session<'fw> {
        self.send_best_effort(&OtaMessagesBuilder::new().complete());
        info!("LoRaOTA: Firmware transmission complete");
        Session::Idle
    }

    /// Repeats the Init while announcing, otherwise chunk `index`.
    pub(crate) fn resend(&mut self, tx: &mut TransmittingState<'fw>, index: u16) {
        match tx.phase {
            TxPhase::Announcing => {
                self.send_best_effort(&Message::Init(tx.metadata));
                tx.pending_init_acks = tx.pending_init_acks.saturating_add(1);
            }
            TxPhase::Streaming => {
                let _ = self.send_chunk(tx, index);
            }
        }
    }

    fn send_chunk(&mut self, tx: &TransmittingState<'fw>, index: u16) -> Result<(), SendFailed> {
        let chunk = OtaMessagesBuilder::new()
            .chunk(tx.image)
            .chunk_index(index)
            .build()
            .map_err(|e| {
                warn!("LoRaOTA: Cannot send chunk: {}", e);
                SendFailed
            })?;

        if let Message::Chunk(c) = &chunk {
            info!(
                "LoRaOTA: Sending chunk {}/{} ({} bytes)",
                u32::from(index) + 1,
                tx.metadata.total_chunks,
                c.data.len()
            );
        }
        self.send(&chunk)
    }
}
