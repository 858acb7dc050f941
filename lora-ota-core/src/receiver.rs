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

//! Receiving side: accepts an Init, writes chunks strictly in order and commits
//! the image once the last one has landed.

use core::mem;

use log::{debug, error, info, warn};
use lora_ota_messages::PROTOCOL_VERSION;
use lora_ota_messages::transfer::builder::OtaMessagesBuilder;
use lora_ota_messages::transfer::chunk::Chunk;
use lora_ota_messages::transfer::metadata::FirmwareMetadata;

use crate::port::{FlashSink, Transport};
use crate::session::{ReceivingState, Session};
use crate::{LoRaOta, OtaError};

impl<'fw, T: Transport, F: FlashSink> LoRaOta<'fw, T, F> {
    pub(crate) fn on_init(&mut self, metadata: FirmwareMetadata, now_ms: u64) {
        let repeated = matches!(
            &self.session,
            Session::Receiving(rx) if rx.metadata == metadata && rx.expected_chunk == 0
        );
        if repeated {
            // our Ack(0) was lost
            debug!("LoRaOTA: Repeated INIT, acknowledging again");
            if let Session::Receiving(rx) = &mut self.session {
                rx.last_activity_ms = now_ms;
            }
            self.send_best_effort(&OtaMessagesBuilder::new().ack(0));
            return;
        }
        if !matches!(self.session, Session::Idle | Session::Armed) {
            warn!("LoRaOTA: Ignoring INIT, transfer already in progress");
            return;
        }

        info!("LoRaOTA: Received firmware update request");
        info!("  Version: {}", metadata.version);
        info!("  Size: {} bytes", metadata.total_size);
        info!("  Chunks: {}", metadata.total_chunks);
        info!("  CRC32: 0x{:08X}", metadata.crc32);

        if metadata.protocol_version != PROTOCOL_VERSION {
            let err = OtaError::UnsupportedProtocol(metadata.protocol_version);
            warn!("LoRaOTA: {}", err);
            self.last_error = Some(err);
            self.send_best_effort(&OtaMessagesBuilder::new().nack(0));
            return;
        }

        if let Err(e) = self.flash.prepare(metadata.total_size) {
            error!("LoRaOTA: Flash prepare failed: {:?}", e);
            self.last_error = Some(OtaError::FlashPrepareFailed);
            self.send_best_effort(&OtaMessagesBuilder::new().nack(0));
            return;
        }

        self.last_error = None;
        self.session = Session::Receiving(ReceivingState::new(metadata, now_ms));
        self.send_best_effort(&OtaMessagesBuilder::new().ack(0));
    }

    pub(crate) fn on_chunk(&mut self, chunk: Chunk<'_>, now_ms: u64) {
        self.session = match mem::replace(&mut self.session, Session::Idle) {
            Session::Receiving(rx) => self.accept_chunk(rx, chunk, now_ms),
            other => {
                debug!("LoRaOTA: Received chunk but not in receiving state");
                other
            }
        };
    }

    fn accept_chunk(&mut self, mut rx: ReceivingState, chunk: Chunk<'_>, now_ms: u64) -> Session<'fw> {
        let index = chunk.header.chunk_index;

        if index != rx.expected_chunk {
            warn!(
                "LoRaOTA: {}",
                OtaError::OutOfSequence { expected: rx.expected_chunk, received: index }
            );
            self.send_best_effort(&OtaMessagesBuilder::new().nack(rx.expected_chunk));
            return Session::Receiving(rx);
        }

        let expected_len = rx.metadata.chunk_len(index).unwrap_or(0);
        if chunk.header.chunk_size != expected_len {
            warn!(
                "LoRaOTA: {}",
                OtaError::ChunkSizeMismatch {
                    chunk: index,
                    expected: expected_len,
                    received: chunk.header.chunk_size,
                }
            );
            self.send_best_effort(&OtaMessagesBuilder::new().nack(rx.expected_chunk));
            return Session::Receiving(rx);
        }

        if !chunk.is_crc_ok() {
            warn!("LoRaOTA: {}", OtaError::ChunkCrcMismatch { chunk: index });
            self.send_best_effort(&OtaMessagesBuilder::new().nack(rx.expected_chunk));
            rx.retry_count = rx.retry_count.saturating_add(1);
            return Session::Receiving(rx);
        }

        match self.flash.write_next(chunk.data) {
            Ok(written) if written == chunk.data.len() => {}
            Ok(written) => {
                error!(
                    "LoRaOTA: Flash write error - expected {} bytes, wrote {}",
                    chunk.data.len(),
                    written
                );
                return self.abandon(true, OtaError::FlashWriteFailed);
            }
            Err(e) => {
                error!("LoRaOTA: Flash write error: {:?}", e);
                return self.abandon(true, OtaError::FlashWriteFailed);
            }
        }

        rx.image_checksum.update(chunk.data);
        rx.expected_chunk += 1;
        rx.retry_count = 0;
        rx.last_activity_ms = now_ms;
        info!(
            "LoRaOTA: Chunk {}/{} received and written",
            rx.expected_chunk, rx.metadata.total_chunks
        );

        self.send_best_effort(&OtaMessagesBuilder::new().ack(index));

        if rx.expected_chunk >= rx.metadata.total_chunks {
            return self.finalize(rx);
        }
        Session::Receiving(rx)
    }

    /// Checks the assembled image against the sender's CRC, commits it and asks
    /// the flash sink to switch over.
    fn finalize(&mut self, rx: ReceivingState) -> Session<'fw> {
        info!("LoRaOTA: Finalizing update...");
        self.session = Session::Validating;

        let expected = rx.metadata.crc32;
        let actual = rx.image_checksum.finalize();
        if actual != expected {
            return self.abandon(true, OtaError::ImageCrcMismatch { expected, actual });
        }

        if let Err(e) = self.flash.commit() {
            error!("LoRaOTA: Update finalization failed: {:?}", e);
            self.last_error = Some(OtaError::FlashCommitFailed);
            return Session::Error(OtaError::FlashCommitFailed);
        }

        info!("LoRaOTA: Firmware update successful, applying");
        self.send_best_effort(&OtaMessagesBuilder::new().complete());
        self.flash.apply_and_restart();
        Session::Idle
    }
}
