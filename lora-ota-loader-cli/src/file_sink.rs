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

use std::fs::{self, File};
use std::io::{Error as IoError, ErrorKind, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use lora_ota_core::FlashSink;

/// Writes a received image to `<output>.part` and renames it to `<output>` once
/// the whole image has been verified.
pub(crate) struct FileFlashSink {
    output: PathBuf,
    partial: PathBuf,
    file: Option<File>,
    expected_size: u32,
    written: u32,
}

impl FileFlashSink {
    pub(crate) fn new(output: &Path) -> Self {
        let mut partial = output.as_os_str().to_owned();
        partial.push(".part");

        Self {
            output: output.to_path_buf(),
            partial: PathBuf::from(partial),
            file: None,
            expected_size: 0,
            written: 0,
        }
    }

    pub(crate) fn partial_path(&self) -> &Path {
        &self.partial
    }
}

impl FlashSink for FileFlashSink {
    type Error = IoError;

    fn prepare(&mut self, total_size: u32) -> IoResult<()> {
        self.file = Some(File::create(&self.partial)?);
        self.expected_size = total_size;
        self.written = 0;
        log::debug!("Writing image to {}", self.partial.display());
        Ok(())
    }

    fn write_next(&mut self, bytes: &[u8]) -> IoResult<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| IoError::new(ErrorKind::NotConnected, "No update in progress"))?;
        file.write_all(bytes)?;
        self.written = self.written.saturating_add(bytes.len() as u32);
        Ok(bytes.len())
    }

    fn commit(&mut self) -> IoResult<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| IoError::new(ErrorKind::NotConnected, "No update in progress"))?;
        if self.written != self.expected_size {
            return Err(IoError::new(
                ErrorKind::InvalidData,
                format!("Expected {} bytes, received {}", self.expected_size, self.written),
            ));
        }

        file.sync_all()?;
        drop(file);
        fs::rename(&self.partial, &self.output)
    }

    fn discard(&mut self) {
        self.file = None;
        if let Err(e) = fs::remove_file(&self.partial) {
            log::debug!("Could not remove {}: {}", self.partial.display(), e);
        }
    }

    fn apply_and_restart(&mut self) {
        log::info!("Firmware image ready at {}", self.output.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lora-ota-{}-{}.bin", std::process::id(), name))
    }

    #[test]
    fn committed_image_lands_at_output() {
        let output = scratch_path("commit");
        let mut sink = FileFlashSink::new(&output);

        sink.prepare(6).unwrap();
        assert!(sink.partial_path().exists());
        assert_eq!(sink.write_next(&[1, 2, 3]).unwrap(), 3);
        assert_eq!(sink.write_next(&[4, 5, 6]).unwrap(), 3);
        sink.commit().unwrap();

        assert_eq!(fs::read(&output).unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert!(!sink.partial_path().exists());
        fs::remove_file(&output).unwrap();
    }

    #[test]
    fn short_image_is_not_committed() {
        let output = scratch_path("short");
        let mut sink = FileFlashSink::new(&output);

        sink.prepare(10).unwrap();
        sink.write_next(&[0; 4]).unwrap();
        assert_eq!(sink.commit().unwrap_err().kind(), ErrorKind::InvalidData);
        assert!(!output.exists());

        sink.discard();
        assert!(!sink.partial_path().exists());
    }

    #[test]
    fn write_without_prepare_fails() {
        let mut sink = FileFlashSink::new(&scratch_path("unprepared"));
        assert_eq!(sink.write_next(&[1]).unwrap_err().kind(), ErrorKind::NotConnected);
    }
}
