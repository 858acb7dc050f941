#![cfg_attr(not(test), no_std)]
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

//! Reliable firmware delivery over a lossy, small-packet radio link.
//!
//! One [`LoRaOta`] instance lives on each device. The host calls
//! [`LoRaOta::service`] from its main loop with a millisecond timestamp; every
//! packet is handled and every timeout checked inside that call. A device either
//! pushes an image with [`LoRaOta::send_firmware`] or takes one in after
//! [`LoRaOta::begin_receiving`], one chunk in flight at a time.

mod config;
mod error;
mod port;
mod receiver;
mod session;
mod transmitter;


use log::{error, info, warn};
use lora_ota_messages::transfer::metadata::FirmwareMetadata;

pub use config::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS, OtaConfig};
pub use error::{ErrorKind, OtaError};
pub use lora_ota_messages::custom_data_types::TransferState as OtaState;
pub use lora_ota_messages::{CHUNK_SIZE, MAX_PACKET_SIZE, PROTOCOL_VERSION};
pub use port::{FlashSink, NoFlash, ReceiveUnsupported, Transport};

use session::Session;

/// Longest target device id `send_firmware` accepts.
pub const MAX_TARGET_ID_LEN: usize = 32;

/// Device the firmware is meant for; empty means every listening device.
pub type TargetId = heapless::String<MAX_TARGET_ID_LEN>;

/// Receive buffer handed to the transport; comfortably above `MAX_PACKET_SIZE`.
const RX_BUFFER_SIZE: usize = 256;

pub struct LoRaOta<'fw, T, F> {
    transport: T,
    flash: F,
    config: OtaConfig,
    session: Session<'fw>,
    last_error: Option<OtaError>,
    enabled: bool,
    initialized: bool,
}

impl<'fw, T: Transport, F: FlashSink> LoRaOta<'fw, T, F> {
    pub fn new(transport: T, flash: F) -> Self {
        Self::with_config(transport, flash, OtaConfig::default())
    }

    pub fn with_config(transport: T, flash: F, config: OtaConfig) -> Self {
        Self {
            transport,
            flash,
            config,
            session: Session::Idle,
            last_error: None,
            enabled: true,
            initialized: false,
        }
    }

    /// Brings up the transport. Calling it again once it has succeeded is a no-op.
    pub fn initialize(&mut self) -> Result<(), OtaError> {
        if self.initialized {
            return Ok(());
        }

        info!("LoRaOTA: Initializing...");
        if let Err(e) = self.transport.initialize() {
            error!("LoRaOTA: Transport initialization failed: {:?}", e);
            self.last_error = Some(OtaError::TransportInitFailed);
            return Err(OtaError::TransportInitFailed);
        }

        self.initialized = true;
        self.session = Session::Idle;
        info!("LoRaOTA: Ready for firmware updates via LoRa");
        Ok(())
    }

    /// Handles at most one incoming packet, then runs the timeout checks.
    /// Does nothing until initialized, or while disabled.
    pub fn service(&mut self, now_ms: u64) {
        if !self.initialized || !self.enabled {
            return;
        }

        if self.transport.is_packet_available() {
            let mut buffer = [0u8; RX_BUFFER_SIZE];
            match self.transport.receive_packet(&mut buffer) {
                Ok(0) => {}
                Ok(len) => self.process_packet(&buffer[..len.min(RX_BUFFER_SIZE)], now_ms),
                Err(e) => warn!("LoRaOTA: Receive failed: {:?}", e),
            }
        }

        self.check_timeouts(now_ms);
    }

    /// Arms the device to accept the next Init from a sender.
    pub fn begin_receiving(&mut self) -> Result<(), OtaError> {
        if !self.initialized {
            return Err(OtaError::NotInitialized);
        }
        if !matches!(self.session, Session::Idle) {
            return Err(OtaError::AlreadyInProgress);
        }

        info!("LoRaOTA: Ready to receive firmware update");
        self.session = Session::Armed;
        Ok(())
    }

    /// Starts pushing `image` to `target_id`, or to every listening device when
    /// it is empty. The image must stay untouched until the transfer ends.
    pub fn send_firmware(
        &mut self,
        image: &'fw [u8],
        version: &str,
        target_id: &str,
        now_ms: u64,
    ) -> Result<(), OtaError> {
        if !self.initialized {
            return Err(OtaError::NotInitialized);
        }
        if !matches!(self.session, Session::Idle) {
            return Err(OtaError::AlreadyInProgress);
        }

        let result = self.start_transmission(image, version, target_id, now_ms);
        if let Err(e) = result {
            self.last_error = Some(e);
        }
        result
    }

    /// Cancels the active transfer, or clears the Error state.
    pub fn abort(&mut self) {
        self.session = match core::mem::replace(&mut self.session, Session::Idle) {
            Session::Idle => Session::Idle,
            Session::Armed => {
                info!("LoRaOTA: No longer waiting for an update");
                Session::Idle
            }
            Session::Error(cause) => {
                info!("LoRaOTA: Clearing error state ({})", cause);
                Session::Idle
            }
            Session::Receiving(_) | Session::Validating => self.abandon(true, OtaError::AbortedByHost),
            Session::Transmitting(_) => self.abandon(false, OtaError::AbortedByHost),
        };
    }

    pub fn state(&self) -> OtaState {
        self.session.public_state()
    }

    /// Share of chunks written (receiving) or acknowledged (sending), 0 to 100.
    pub fn progress_percent(&self) -> u8 {
        self.session.progress_percent()
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state(), OtaState::Idle | OtaState::Error)
    }

    pub fn last_error(&self) -> Option<OtaError> {
        self.last_error
    }

    /// Empty when nothing has failed since the last session started.
    pub fn last_error_message(&self) -> &'static str {
        self.last_error.map(|e| e.message()).unwrap_or("")
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Metadata of the image being sent or received.
    pub fn metadata(&self) -> Option<&FirmwareMetadata> {
        self.session.metadata()
    }

    /// Target of the transfer being sent; empty for broadcast.
    pub fn target_id(&self) -> Option<&str> {
        match &self.session {
            Session::Transmitting(tx) => Some(tx.target.as_str()),
            _ => None,
        }
    }

    pub fn config(&self) -> &OtaConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn into_parts(self) -> (T, F) {
        (self.transport, self.flash)
    }
}
