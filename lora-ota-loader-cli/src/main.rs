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

mod file_sink;
mod serial_transport;
mod util;

use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::Path;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use lora_ota_core::{FlashSink, LoRaOta, NoFlash, OtaState};
use lora_ota_messages::checksum::crc32;

use crate::file_sink::FileFlashSink;
use crate::serial_transport::SerialRadio;
use crate::util::{Command, Options};

const SERVICE_INTERVAL: Duration = Duration::from_millis(10);

fn main() -> IoResult<()> {
    let log_level = util::parse_log_level();

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = match util::parse_options(&args) {
        Ok(options) => options,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{}", util::USAGE);
            return Err(e);
        }
    };

    log::info!("LoRa OTA Firmware Loader");
    log::info!("========================\n");

    let port_name = match &options.port {
        Some(port) => port.clone(),
        None => first_serial_port()?,
    };

    log::info!("Connecting to: {}", port_name);
    let radio = SerialRadio::open(&port_name, options.baud_rate)?;
    log::info!("Connected successfully!");
    log::info!("Baud rate: {}", options.baud_rate);
    log::info!("Timeout: {} ms, retries: {}\n", options.config.timeout_ms, options.config.max_retries);

    match &options.command {
        Command::Send { image } => send(radio, &options, image),
        Command::Receive { output } => receive(radio, &options, output),
    }
}

fn first_serial_port() -> IoResult<String> {
    let ports = serialport::available_ports().map_err(|e| IoError::new(ErrorKind::Other, e.to_string()))?;

    log::info!("Available serial ports:");
    for port in &ports {
        log::info!("  - {}", port.port_name);
    }

    ports
        .first()
        .map(|port| port.port_name.clone())
        .ok_or_else(|| IoError::new(ErrorKind::NotFound, "No serial ports found!"))
}

fn send(radio: SerialRadio, options: &Options, image_path: &Path) -> IoResult<()> {
    let firmware = util::read_binary_file(image_path)?;
    log::info!("Firmware image: {} ({} bytes)", image_path.display(), firmware.len());
    log::debug!("Image CRC32: 0x{:08X}", crc32(&firmware));

    let mut ota = LoRaOta::with_config(radio, NoFlash, options.config);
    ota.initialize().map_err(session_error)?;

    let clock = Instant::now();
    ota.send_firmware(&firmware, &options.version, &options.target, elapsed_ms(clock))
        .map_err(session_error)?;

    let bar = progress_bar("Sending")?;
    run_session(&mut ota, clock, &bar);
    finish(&ota, &bar)
}

fn receive(radio: SerialRadio, options: &Options, output: &Path) -> IoResult<()> {
    let sink = FileFlashSink::new(output);
    log::debug!("Partial image goes to {}", sink.partial_path().display());

    let mut ota = LoRaOta::with_config(radio, sink, options.config);
    ota.initialize().map_err(session_error)?;
    ota.begin_receiving().map_err(session_error)?;
    log::info!("Waiting for a sender...");

    let bar = progress_bar("Receiving")?;
    run_session(&mut ota, Instant::now(), &bar);
    finish(&ota, &bar)
}

/// Services the session until it goes back to Idle or stops in Error.
fn run_session<F: FlashSink>(ota: &mut LoRaOta<'_, SerialRadio, F>, clock: Instant, bar: &ProgressBar) {
    let mut announced = false;
    loop {
        ota.service(elapsed_ms(clock));

        if !announced {
            if let Some(metadata) = ota.metadata() {
                bar.set_message(format!("v{} ({} bytes)", metadata.version, metadata.total_size));
                announced = true;
            }
        }
        bar.set_position(u64::from(ota.progress_percent()));

        if !ota.is_active() {
            break;
        }
        std::thread::sleep(SERVICE_INTERVAL);
    }
}

fn finish<F: FlashSink>(ota: &LoRaOta<'_, SerialRadio, F>, bar: &ProgressBar) -> IoResult<()> {
    match ota.last_error() {
        None if ota.state() == OtaState::Idle => {
            bar.set_position(100);
            bar.finish_with_message("done");
            log::info!("Transfer completed");
            Ok(())
        }
        None => {
            bar.abandon();
            Err(IoError::new(ErrorKind::Other, "Transfer stopped in an unknown state"))
        }
        Some(e) => {
            bar.abandon_with_message(e.message());
            log::error!("Transfer failed: {}", e);
            Err(session_error(e))
        }
    }
}

fn progress_bar(label: &'static str) -> IoResult<ProgressBar> {
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}% {msg}")
        .map_err(|e| IoError::new(ErrorKind::Other, e.to_string()))?
        .progress_chars("#>-");

    let bar = ProgressBar::new(100);
    bar.set_style(style);
    bar.set_prefix(label);
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

fn elapsed_ms(clock: Instant) -> u64 {
    u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn session_error(e: lora_ota_core::OtaError) -> IoError {
    IoError::new(ErrorKind::Other, e.to_string())
}
