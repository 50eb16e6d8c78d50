// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Spoolcast print pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Control port for implicit FTPS (TLS starts on connect).
pub const IMPLICIT_FTPS_PORT: u16 = 990;

/// MQTT over TLS port exposed by the printer's broker.
pub const MQTT_TLS_PORT: u16 = 8883;

/// Username the printer's broker expects; the password is the access code.
pub const CONTROL_USERNAME: &str = "bblp";

/// Suffix of a sliced project archive.
pub const SLICED_ARCHIVE_SUFFIX: &str = ".gcode.3mf";

/// Location prefix the printer resolves uploaded files against.
pub const SDCARD_URL_PREFIX: &str = "file:///sdcard/";

/// Reference read/write chunk size for uploads.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Unique identifier for one slice-and-print run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStage {
    Extract,
    Slice,
    Package,
    Upload,
    Publish,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Extract => "extract",
            Self::Slice => "slice",
            Self::Package => "package",
            Self::Upload => "upload",
            Self::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Flaky link or busy printer; safe to retry automatically.
    Transient,
    /// Wrong credentials or path; the user has to fix the configuration.
    UserAction,
    /// Will not change on retry (bad config, unexpected protocol reply).
    Permanent,
    /// A bare timeout after the payload went out. Some printer firmware
    /// drops the link right after accepting a file, so this is counted as
    /// delivered. Heuristic, not a protocol guarantee.
    AssumedDelivered,
}

/// Outcome of a single transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Success,
    RetryableError,
    FatalError,
}

/// One try within a bounded retry sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAttempt {
    /// 1-based attempt index.
    pub index: u32,
    pub outcome: AttemptOutcome,
    pub bytes_transferred: u64,
    pub error: Option<String>,
}

/// Byte-level upload progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    /// Percentage complete. An empty file counts as fully sent.
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        self.bytes_sent as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Summary of a completed slice-and-print run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub job_id: JobId,
    /// Remote file name the printer was told to print.
    pub archive_name: String,
    /// SHA-256 of the uploaded archive.
    pub archive_sha256: String,
    pub bytes_uploaded: u64,
    pub upload_attempts: u32,
    /// Upload counted as delivered after a bare timeout.
    pub assumed_delivered: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_partial_transfer() {
        let p = TransferProgress {
            bytes_sent: 4096,
            total_bytes: 8192,
        };
        assert!((p.percent() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_file_is_complete() {
        let p = TransferProgress {
            bytes_sent: 0,
            total_bytes: 0,
        };
        assert_eq!(p.percent(), 100.0);
    }

    #[test]
    fn stage_names_are_lowercase() {
        assert_eq!(JobStage::Upload.to_string(), "upload");
        assert_eq!(JobStage::Publish.to_string(), "publish");
    }
}
