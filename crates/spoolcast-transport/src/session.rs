// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Seams between the upload orchestrator and the file-transfer session.
//
// `SecureTransferClient` is the real implementation; tests script their own
// sessions to drive the retry loop without a printer.

use std::path::Path;
use std::time::Duration;

use spoolcast_core::error::Result;

/// One encrypted file-transfer session, used by a single caller in order:
/// connect, login, protect, passive, store, close.
///
/// Implementations report faults; they never retry on their own.
#[allow(async_fn_in_trait)]
pub trait TransferSession {
    /// Open the control connection and complete the TLS handshake and greeting.
    async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<()>;

    async fn login(&mut self, user: &str, password: &str) -> Result<()>;

    /// Switch data connections to TLS for the rest of the session.
    async fn enable_protected_data_mode(&mut self) -> Result<()>;

    fn set_passive_mode(&mut self, enabled: bool);

    /// Upload `source` as `remote_name`, reading `buffer_size` bytes at a time
    /// and reporting the running byte count after every chunk.
    async fn store_file(
        &mut self,
        source: &Path,
        remote_name: &str,
        buffer_size: usize,
        on_progress: &mut dyn FnMut(u64),
    ) -> Result<u64>;

    /// Tear the session down. Safe to call more than once.
    async fn close(&mut self);
}

/// Produces a fresh session for every upload attempt.
pub trait SessionFactory {
    type Session: TransferSession;

    fn new_session(&self) -> Self::Session;
}
