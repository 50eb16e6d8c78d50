// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry decisions for printer uploads and print triggers.
//
// Classifies errors into Transient (retry after a fixed backoff), UserAction
// and Permanent (give up at once), and AssumedDelivered (the bare-timeout
// firmware quirk, treated as success). Session types never make this call.

use std::time::Duration;

use spoolcast_core::error::SpoolcastError;
use spoolcast_core::types::ErrorClass;
use tracing::{debug, info, warn};

/// Result of evaluating whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry: error is permanent or user action needed.
    GiveUp(ErrorClass),
    /// Maximum attempts used up.
    Exhausted,
    /// Stop and report success; the payload is believed delivered.
    AssumeDelivered,
}

/// Classify a `SpoolcastError` into an `ErrorClass` for retry decisions.
pub fn classify_error(err: &SpoolcastError) -> ErrorClass {
    match err {
        // Transient: flaky link, busy printer, garbled reply
        SpoolcastError::ConnectTimeout { .. } => ErrorClass::Transient,
        SpoolcastError::TransientTransfer(_) => ErrorClass::Transient,
        SpoolcastError::Protocol(_) => ErrorClass::Transient,
        SpoolcastError::Mqtt(_) => ErrorClass::Transient,

        // Heuristic: bare timeout once the payload is out
        SpoolcastError::SilentTimeout => ErrorClass::AssumedDelivered,

        // User action needed
        SpoolcastError::Auth(_) => ErrorClass::UserAction,
        SpoolcastError::Permission { .. } => ErrorClass::UserAction,
        SpoolcastError::Configuration(_) => ErrorClass::UserAction,
        SpoolcastError::Slicer(_) => ErrorClass::UserAction,

        // Permanent
        SpoolcastError::ProtocolReply { .. } => ErrorClass::Permanent,
        SpoolcastError::InvalidSessionState { .. } => ErrorClass::Permanent,
        SpoolcastError::UploadExhausted { .. } => ErrorClass::Permanent,
        SpoolcastError::PublishExhausted { .. } => ErrorClass::Permanent,
        SpoolcastError::Archive(_) => ErrorClass::Permanent,
        SpoolcastError::Serialization(_) => ErrorClass::Permanent,

        // IO errors depend on the kind
        SpoolcastError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::Interrupted => ErrorClass::Transient,
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorClass::UserAction
            }
            _ => ErrorClass::Transient,
        },
    }
}

/// Decide what to do after attempt number `attempt` (1-based) failed.
///
/// The backoff is fixed and only applies between attempts.
pub fn should_retry(
    err: &SpoolcastError,
    attempt: u32,
    max_attempts: u32,
    backoff: Duration,
) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::AssumedDelivered => {
            warn!(attempt, "bare timeout after sending; assuming the printer accepted the file");
            RetryDecision::AssumeDelivered
        }
        ErrorClass::Permanent => {
            info!(error = %err, "permanent error, not retrying");
            RetryDecision::GiveUp(ErrorClass::Permanent)
        }
        ErrorClass::UserAction => {
            info!(error = %err, "user action required, not retrying");
            RetryDecision::GiveUp(ErrorClass::UserAction)
        }
        ErrorClass::Transient => {
            if attempt >= max_attempts {
                warn!(attempt, max = max_attempts, "retry limit exhausted");
                RetryDecision::Exhausted
            } else {
                debug!(attempt, delay_ms = backoff.as_millis() as u64, "scheduling retry");
                RetryDecision::RetryAfter(backoff)
            }
        }
    }
}
