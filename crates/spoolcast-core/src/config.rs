// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.
//
// The on-disk format is the JSON settings file printers are usually set up
// with (`settings/config.json`), so the key names are kept as they appear
// there, including `PrinterIP`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpoolcastError};
use crate::types::DEFAULT_CHUNK_SIZE;

/// Persistent pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory the input project is unpacked into.
    pub extract_folder: PathBuf,
    /// Directory the slicer writes into.
    pub output_dir: PathBuf,
    /// File name the slicer produces inside `output_dir`.
    pub output_gcode: String,
    /// Settings files passed to the slicer with `--load-settings`.
    pub settings_files: Vec<PathBuf>,
    /// Slicer executable.
    pub slicer_path: PathBuf,
    /// Printer address (FTPS and MQTT both live here).
    #[serde(rename = "PrinterIP")]
    pub printer_ip: String,
    /// FTPS user.
    pub user: String,
    /// LAN access code; FTPS password and MQTT password.
    pub password: String,
    /// Device serial, used for the MQTT topic.
    pub serial: String,
    /// Printer CA certificate. Relative paths resolve against the directory
    /// holding the config file; unset means `settings/printer-ca.pem` next
    /// to the executable.
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    /// Print command template with a `print` object. Relative paths resolve
    /// like `ca_cert`; unset means `message.json` beside the config file.
    #[serde(default)]
    pub message_template: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl AppConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SpoolcastError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
            .map_err(|e| SpoolcastError::Configuration(format!("{}: {e}", path.display())))
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| SpoolcastError::Configuration(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.printer_ip.trim().is_empty() {
            return Err(SpoolcastError::Configuration("PrinterIP is empty".into()));
        }
        if self.serial.trim().is_empty() {
            return Err(SpoolcastError::Configuration("serial is empty".into()));
        }
        self.retry.validate()
    }
}

/// Directory holding the running executable. Default settings live beside it.
pub fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| {
        SpoolcastError::Configuration(format!("cannot locate the running executable: {e}"))
    })?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        SpoolcastError::Configuration(format!("{} has no parent directory", exe.display()))
    })
}

/// Retry, backoff, and timeout settings for both transport branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per transport operation (upload and publish each).
    pub max_attempts: u32,
    /// Fixed wait between failed upload attempts.
    pub backoff_secs: u64,
    /// How long to wait for the broker's connection acknowledgment.
    pub ack_grace_secs: u64,
    /// TCP connect + TLS handshake + greeting.
    pub connect_timeout_secs: u64,
    /// Wait for a single control or data channel operation.
    pub reply_timeout_secs: u64,
    /// Upload chunk size in bytes.
    pub chunk_size: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 5,
            ack_grace_secs: 2,
            connect_timeout_secs: 2,
            reply_timeout_secs: 2,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn ack_grace(&self) -> Duration {
        Duration::from_secs(self.ack_grace_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SpoolcastError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(SpoolcastError::Configuration(
                "retry.chunk_size must be at least 1 byte".into(),
            ));
        }
        Ok(())
    }
}
