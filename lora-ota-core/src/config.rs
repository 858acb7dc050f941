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

/// Time without peer activity before a retry is attempted.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Retries per chunk before the session is abandoned.
pub const DEFAULT_MAX_RETRIES: u8 = 3;

/// Retry and timeout policy for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaConfig {
    pub timeout_ms: u64,
    pub max_retries: u8,
}

impl OtaConfig {
    pub fn new() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self::new()
    }
}
