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

use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::PathBuf;

use log::LevelFilter;
use lora_ota_core::OtaConfig;

pub(crate) const DEFAULT_BAUD_RATE: u32 = 115200;

/// Flags that take a value. Their values are never treated as positional arguments.
const VALUE_FLAGS: [&str; 7] = [
    "--log-level",
    "--port",
    "--baud",
    "--version",
    "--target",
    "--timeout-ms",
    "--retries",
];

pub(crate) const USAGE: &str = "\
Usage:
  lora-ota-loader-cli send <image> [--version <label>] [--target <device id>]
  lora-ota-loader-cli receive <output>

Options:
  --port <name>        Serial port of the LoRa modem (default: first port found)
  --baud <rate>        Serial baud rate (default: 115200)
  --timeout-ms <ms>    Time without a reply before retrying (default: 5000)
  --retries <count>    Retries before giving up (default: 3)
  --log-level <level>  OFF, ERROR, WARN, INFO, DEBUG or TRACE (default: INFO)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Send { image: PathBuf },
    Receive { output: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Options {
    pub(crate) command: Command,
    pub(crate) port: Option<String>,
    pub(crate) baud_rate: u32,
    pub(crate) version: String,
    pub(crate) target: String,
    pub(crate) config: OtaConfig,
}

pub(crate) fn parse_log_level() -> LevelFilter {
    std::env::args()
        .position(|arg| arg == "--log-level")
        .and_then(|i| std::env::args().nth(i + 1))
        .as_deref()
        .map(|level_str| match level_str.to_uppercase().as_str() {
            "OFF" => LevelFilter::Off,
            "TRACE" => LevelFilter::Trace,
            "DEBUG" => LevelFilter::Debug,
            "INFO" => LevelFilter::Info,
            "WARN" => LevelFilter::Warn,
            "ERROR" => LevelFilter::Error,
            _ => {
                eprintln!("Unknown log level: {}. Using INFO", level_str);
                LevelFilter::Info
            }
        })
        .unwrap_or(LevelFilter::Info)
}

/// Parses the command line, `args[0]` being the program name.
pub(crate) fn parse_options(args: &[String]) -> IoResult<Options> {
    let positional = positional_args(args);
    let command = match positional.as_slice() {
        ["send", image] => Command::Send { image: PathBuf::from(*image) },
        ["receive", output] => Command::Receive { output: PathBuf::from(*output) },
        [] => return Err(invalid_input("No command given")),
        [other, ..] if *other != "send" && *other != "receive" => {
            return Err(invalid_input(&format!("Unknown command: {}", other)));
        }
        _ => return Err(invalid_input("Expected exactly one file path")),
    };

    let mut config = OtaConfig::default();
    if let Some(timeout_ms) = parsed_flag(args, "--timeout-ms")? {
        config = config.timeout_ms(timeout_ms);
    }
    if let Some(retries) = parsed_flag(args, "--retries")? {
        config = config.max_retries(retries);
    }

    Ok(Options {
        command,
        port: flag_value(args, "--port").map(str::to_owned),
        baud_rate: parsed_flag(args, "--baud")?.unwrap_or(DEFAULT_BAUD_RATE),
        version: flag_value(args, "--version").unwrap_or_default().to_owned(),
        target: flag_value(args, "--target").unwrap_or_default().to_owned(),
        config,
    })
}

fn positional_args(args: &[String]) -> Vec<&str> {
    let mut positional = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            positional.push(arg.as_str());
        }
    }
    positional
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parsed_flag<V: std::str::FromStr>(args: &[String], flag: &str) -> IoResult<Option<V>> {
    flag_value(args, flag)
        .map(|value| {
            value
                .parse()
                .map_err(|_| invalid_input(&format!("Invalid value for {}: {}", flag, value)))
        })
        .transpose()
}

fn invalid_input(message: &str) -> IoError {
    IoError::new(ErrorKind::InvalidInput, message.to_owned())
}

pub(crate) fn read_binary_file(path: &std::path::Path) -> IoResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| IoError::new(e.kind(), format!("Failed to read firmware file: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_owned).collect()
    }

    #[test]
    fn send_with_all_flags() {
        let options = parse_options(&args(
            "loader --port /dev/ttyUSB0 send fw.bin --version 2.0.0 --target BRAVO_001 \
             --baud 57600 --timeout-ms 2000 --retries 5 --log-level debug",
        ))
        .unwrap();

        assert_eq!(options.command, Command::Send { image: PathBuf::from("fw.bin") });
        assert_eq!(options.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(options.baud_rate, 57600);
        assert_eq!(options.version, "2.0.0");
        assert_eq!(options.target, "BRAVO_001");
        assert_eq!(options.config, OtaConfig::new().timeout_ms(2000).max_retries(5));
    }

    #[test]
    fn receive_uses_defaults() {
        let options = parse_options(&args("loader receive out.bin")).unwrap();
        assert_eq!(options.command, Command::Receive { output: PathBuf::from("out.bin") });
        assert_eq!(options.port, None);
        assert_eq!(options.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(options.target, "");
        assert_eq!(options.config, OtaConfig::default());
    }

    #[test]
    fn flag_values_are_not_paths() {
        let options = parse_options(&args("loader send --version receive fw.bin")).unwrap();
        assert_eq!(options.command, Command::Send { image: PathBuf::from("fw.bin") });
        assert_eq!(options.version, "receive");
    }

    #[test]
    fn bad_command_lines_are_rejected() {
        for line in [
            "loader",
            "loader flash fw.bin",
            "loader send",
            "loader send a.bin b.bin",
            "loader send fw.bin --retries many",
            "loader receive out.bin --baud -1",
        ] {
            let err = parse_options(&args(line)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{line}");
        }
    }
}
