// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Spoolcast.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all Spoolcast operations.
///
/// Session types only report what went wrong; whether a variant is retried is
/// decided by the orchestrators via `ErrorClass`.
#[derive(Debug, Error)]
pub enum SpoolcastError {
    // -- Configuration --
    #[error("configuration error: {0}")]
    Configuration(String),

    // -- File transfer --
    #[error("connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("transient transfer error: {0}")]
    TransientTransfer(String),

    /// The server sent something that is not a well-formed FTP reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A socket timed out with nothing else to report.
    #[error("socket timed out without a reply")]
    SilentTimeout,

    #[error("login rejected: {0}")]
    Auth(String),

    #[error("permission denied ({code}): {message}")]
    Permission { code: u16, message: String },

    /// Well-formed reply with a code the current command does not allow.
    #[error("unexpected reply ({code}): {message}")]
    ProtocolReply { code: u16, message: String },

    #[error("upload failed: exhausted retries after {attempts} attempt(s)")]
    UploadExhausted { attempts: u32 },

    #[error("transfer session is {actual}, expected {expected}")]
    InvalidSessionState {
        expected: &'static str,
        actual: &'static str,
    },

    // -- Control channel --
    #[error("MQTT error: {0}")]
    Mqtt(String),

    #[error("print command not published after {attempts} attempt(s)")]
    PublishExhausted { attempts: u32 },

    // -- Project files --
    #[error("archive error: {0}")]
    Archive(String),

    #[error("slicer failed: {0}")]
    Slicer(String),

    // -- Storage / serialization --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpoolcastError>;
