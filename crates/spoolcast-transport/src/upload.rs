// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Upload orchestration: a bounded retry loop around fresh FTPS sessions.
//
// Each attempt opens a new session and walks it through connect, login,
// protected data mode, passive mode and store. The session is closed on
// every exit path. What happens after a failure is decided by
// `retry::should_retry`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, instrument, warn};

use spoolcast_core::config::RetryPolicy;
use spoolcast_core::error::{Result, SpoolcastError};
use spoolcast_core::types::{AttemptOutcome, IMPLICIT_FTPS_PORT, TransferAttempt, TransferProgress};

use crate::retry::{RetryDecision, should_retry};
use crate::session::{SessionFactory, TransferSession};

/// What to send and where.
#[derive(Clone)]
pub struct UploadRequest {
    pub file_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// File name on the printer's storage.
    pub remote_target: String,
}

impl UploadRequest {
    /// Request against the implicit-FTPS port.
    pub fn new(
        file_path: impl Into<PathBuf>,
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        remote_target: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            host: host.into(),
            port: IMPLICIT_FTPS_PORT,
            user: user.into(),
            password: password.into(),
            remote_target: remote_target.into(),
        }
    }
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("file_path", &self.file_path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("remote_target", &self.remote_target)
            .finish()
    }
}

/// A finished upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub bytes_transferred: u64,
    /// The final attempt ended in a bare timeout and was counted as
    /// delivered.
    pub assumed_delivered: bool,
    pub attempts: Vec<TransferAttempt>,
}

/// Why an upload did not go through.
#[derive(Debug, Error)]
pub enum UploadFailure {
    /// A non-retryable error stopped the loop.
    #[error("upload aborted: {error}")]
    Aborted {
        #[source]
        error: SpoolcastError,
        attempts: Vec<TransferAttempt>,
    },

    #[error("exhausted retries")]
    ExhaustedRetries {
        attempts: Vec<TransferAttempt>,
        #[source]
        last_error: Option<SpoolcastError>,
    },
}

impl UploadFailure {
    pub fn attempts(&self) -> &[TransferAttempt] {
        match self {
            Self::Aborted { attempts, .. } | Self::ExhaustedRetries { attempts, .. } => attempts,
        }
    }
}

impl From<UploadFailure> for SpoolcastError {
    fn from(failure: UploadFailure) -> Self {
        match failure {
            UploadFailure::Aborted { error, .. } => error,
            UploadFailure::ExhaustedRetries { attempts, .. } => SpoolcastError::UploadExhausted {
                attempts: attempts.len() as u32,
            },
        }
    }
}

/// Drives sessions from `F` through the retry loop.
#[derive(Debug)]
pub struct TransferOrchestrator<F> {
    factory: F,
    policy: RetryPolicy,
}

impl<F: SessionFactory> TransferOrchestrator<F> {
    pub fn new(factory: F, policy: RetryPolicy) -> Self {
        Self { factory, policy }
    }

    /// Upload `request.file_path`, trying at most `max_attempts` times.
    ///
    /// `on_progress` sees every chunk of every attempt; a retry starts again
    /// from zero. Zero attempts opens no session and reports exhausted retries.
    #[instrument(skip_all, fields(host = %request.host, remote = %request.remote_target))]
    pub async fn upload(
        &self,
        request: &UploadRequest,
        max_attempts: u32,
        mut on_progress: impl FnMut(TransferProgress),
    ) -> std::result::Result<UploadReport, UploadFailure> {
        let total_bytes = match tokio::fs::metadata(&request.file_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                return Err(UploadFailure::Aborted {
                    error: e.into(),
                    attempts: Vec::new(),
                });
            }
        };
        let mut attempts = Vec::new();
        let mut last_error = None;

        for index in 1..=max_attempts {
            info!(attempt = index, max_attempts, total_bytes, "upload attempt");
            let mut session = self.factory.new_session();
            let mut sent = 0u64;
            let result = {
                let mut report = |bytes_sent: u64| {
                    sent = bytes_sent;
                    on_progress(TransferProgress {
                        bytes_sent,
                        total_bytes,
                    });
                };
                run_attempt(&mut session, request, &self.policy, &mut report).await
            };
            session.close().await;

            let err = match result {
                Ok(bytes) => {
                    attempts.push(TransferAttempt {
                        index,
                        outcome: AttemptOutcome::Success,
                        bytes_transferred: bytes,
                        error: None,
                    });
                    info!(attempt = index, bytes, "upload complete");
                    return Ok(UploadReport {
                        bytes_transferred: bytes,
                        assumed_delivered: false,
                        attempts,
                    });
                }
                Err(err) => err,
            };

            match should_retry(&err, index, max_attempts, self.policy.backoff()) {
                RetryDecision::AssumeDelivered => {
                    attempts.push(TransferAttempt {
                        index,
                        outcome: AttemptOutcome::Success,
                        bytes_transferred: sent,
                        error: Some(err.to_string()),
                    });
                    return Ok(UploadReport {
                        bytes_transferred: sent,
                        assumed_delivered: true,
                        attempts,
                    });
                }
                RetryDecision::GiveUp(class) => {
                    warn!(attempt = index, ?class, error = %err, "upload aborted");
                    attempts.push(TransferAttempt {
                        index,
                        outcome: AttemptOutcome::FatalError,
                        bytes_transferred: sent,
                        error: Some(err.to_string()),
                    });
                    return Err(UploadFailure::Aborted { error: err, attempts });
                }
                RetryDecision::RetryAfter(delay) => {
                    warn!(attempt = index, error = %err, "upload attempt failed, retrying");
                    attempts.push(TransferAttempt {
                        index,
                        outcome: AttemptOutcome::RetryableError,
                        bytes_transferred: sent,
                        error: Some(err.to_string()),
                    });
                    last_error = Some(err);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Exhausted => {
                    attempts.push(TransferAttempt {
                        index,
                        outcome: AttemptOutcome::RetryableError,
                        bytes_transferred: sent,
                        error: Some(err.to_string()),
                    });
                    last_error = Some(err);
                    break;
                }
            }
        }

        Err(UploadFailure::ExhaustedRetries {
            attempts,
            last_error,
        })
    }
}

async fn run_attempt<S: TransferSession>(
    session: &mut S,
    request: &UploadRequest,
    policy: &RetryPolicy,
    on_progress: &mut dyn FnMut(u64),
) -> Result<u64> {
    session
        .connect(&request.host, request.port, policy.connect_timeout())
        .await?;
    session.login(&request.user, &request.password).await?;
    session.enable_protected_data_mode().await?;
    session.set_passive_mode(true);
    session
        .store_file(
            &request.file_path,
            &request.remote_target,
            policy.chunk_size,
            on_progress,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use tokio::time::Instant;

    #[derive(Debug, Clone, Copy)]
    enum Script {
        ConnectTimeout,
        Transient,
        Permission,
        Auth,
        Silent,
        Deliver,
    }

    struct ScriptedSession {
        script: Script,
        closes: Arc<AtomicU32>,
    }

    impl TransferSession for ScriptedSession {
        async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<()> {
            match self.script {
                Script::ConnectTimeout => Err(SpoolcastError::ConnectTimeout {
                    addr: format!("{host}:{port}"),
                    timeout,
                }),
                _ => Ok(()),
            }
        }

        async fn login(&mut self, _user: &str, _password: &str) -> Result<()> {
            match self.script {
                Script::Auth => Err(SpoolcastError::Auth("530 Login incorrect.".into())),
                _ => Ok(()),
            }
        }

        async fn enable_protected_data_mode(&mut self) -> Result<()> {
            Ok(())
        }

        fn set_passive_mode(&mut self, _enabled: bool) {}

        async fn store_file(
            &mut self,
            source: &Path,
            _remote_name: &str,
            buffer_size: usize,
            on_progress: &mut dyn FnMut(u64),
        ) -> Result<u64> {
            let len = std::fs::metadata(source)?.len();
            match self.script {
                Script::Transient => {
                    on_progress(len / 2);
                    Err(SpoolcastError::TransientTransfer("connection reset".into()))
                }
                Script::Permission => Err(SpoolcastError::Permission {
                    code: 553,
                    message: "Could not create file.".into(),
                }),
                Script::Silent => {
                    on_progress(len);
                    Err(SpoolcastError::SilentTimeout)
                }
                _ => {
                    let mut sent = 0;
                    while sent < len {
                        sent = (sent + buffer_size as u64).min(len);
                        on_progress(sent);
                    }
                    Ok(len)
                }
            }
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Hands out sessions following `plan`; the last entry repeats.
    struct ScriptedFactory {
        plan: Vec<Script>,
        opened: Arc<AtomicU32>,
        closes: Arc<AtomicU32>,
    }

    impl ScriptedFactory {
        fn new(plan: Vec<Script>) -> Self {
            Self {
                plan,
                opened: Arc::new(AtomicU32::new(0)),
                closes: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    impl SessionFactory for ScriptedFactory {
        type Session = ScriptedSession;

        fn new_session(&self) -> ScriptedSession {
            let n = self.opened.fetch_add(1, Ordering::SeqCst) as usize;
            ScriptedSession {
                script: self.plan[n.min(self.plan.len() - 1)],
                closes: Arc::clone(&self.closes),
            }
        }
    }

    fn payload(len: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        std::io::Write::write_all(&mut file, &vec![0x47; len]).expect("write");
        file
    }

    fn request(file: &tempfile::NamedTempFile) -> UploadRequest {
        UploadRequest::new(file.path(), "192.168.1.50", "bblp", "12345678", "Benchy.gcode.3mf")
    }

    fn orchestrator(plan: Vec<Script>) -> TransferOrchestrator<ScriptedFactory> {
        TransferOrchestrator::new(ScriptedFactory::new(plan), RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_uses_every_attempt() {
        let file = payload(1000);
        let orch = orchestrator(vec![Script::Transient]);
        let start = Instant::now();

        let failure = orch.upload(&request(&file), 3, |_| {}).await.unwrap_err();

        assert_eq!(failure.to_string(), "exhausted retries");
        assert_eq!(failure.attempts().len(), 3);
        assert!(failure
            .attempts()
            .iter()
            .all(|a| a.outcome == AttemptOutcome::RetryableError));
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(orch.factory.opened.load(Ordering::SeqCst), 3);
        assert_eq!(orch.factory.closes.load(Ordering::SeqCst), 3);
        assert!(matches!(
            SpoolcastError::from(failure),
            SpoolcastError::UploadExhausted { attempts: 3 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeouts_are_retried() {
        let file = payload(1000);
        let orch = orchestrator(vec![Script::ConnectTimeout, Script::ConnectTimeout, Script::Deliver]);
        let start = Instant::now();

        let report = orch.upload(&request(&file), 3, |_| {}).await.expect("upload");

        assert_eq!(report.bytes_transferred, 1000);
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn permission_error_aborts_without_backoff() {
        let file = payload(1000);
        let orch = orchestrator(vec![Script::Permission, Script::Deliver]);
        let start = Instant::now();

        let failure = orch.upload(&request(&file), 3, |_| {}).await.unwrap_err();

        assert!(matches!(
            failure,
            UploadFailure::Aborted { error: SpoolcastError::Permission { code: 553, .. }, .. }
        ));
        assert_eq!(failure.attempts().len(), 1);
        assert_eq!(failure.attempts()[0].outcome, AttemptOutcome::FatalError);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(orch.factory.opened.load(Ordering::SeqCst), 1);
        assert_eq!(orch.factory.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_opens_no_session() {
        let file = payload(10);
        let orch = orchestrator(vec![Script::Deliver]);

        let failure = orch.upload(&request(&file), 0, |_| {}).await.unwrap_err();

        assert!(matches!(
            failure,
            UploadFailure::ExhaustedRetries { ref attempts, last_error: None } if attempts.is_empty()
        ));
        assert_eq!(orch.factory.opened.load(Ordering::SeqCst), 0);
        assert!(matches!(
            SpoolcastError::from(failure),
            SpoolcastError::UploadExhausted { attempts: 0 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_error_aborts() {
        let file = payload(10);
        let orch = orchestrator(vec![Script::Auth]);
        let failure = orch.upload(&request(&file), 3, |_| {}).await.unwrap_err();
        assert!(matches!(
            SpoolcastError::from(failure),
            SpoolcastError::Auth(_)
        ));
        assert_eq!(orch.factory.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_then_success() {
        let file = payload(5000);
        let orch = orchestrator(vec![Script::Transient, Script::Deliver]);
        let start = Instant::now();

        let report = orch.upload(&request(&file), 3, |_| {}).await.expect("upload");

        assert!(!report.assumed_delivered);
        assert_eq!(report.bytes_transferred, 5000);
        let outcomes: Vec<_> = report.attempts.iter().map(|a| a.outcome).collect();
        assert_eq!(outcomes, [AttemptOutcome::RetryableError, AttemptOutcome::Success]);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(orch.factory.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn bare_timeout_counts_as_delivered() {
        let file = payload(4096);
        let orch = orchestrator(vec![Script::Silent]);

        let report = orch.upload(&request(&file), 3, |_| {}).await.expect("upload");

        assert!(report.assumed_delivered);
        assert_eq!(report.bytes_transferred, 4096);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(orch.factory.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_reaches_file_size() {
        let file = payload(20_000);
        let orch = orchestrator(vec![Script::Deliver]);
        let mut seen = Vec::new();

        orch.upload(&request(&file), 1, |p| seen.push(p)).await.expect("upload");

        let last = seen.last().copied().expect("progress");
        assert_eq!(last.bytes_sent, 20_000);
        assert_eq!(last.total_bytes, 20_000);
        assert_eq!(last.percent(), 100.0);
        assert_eq!(seen.len(), 20_000usize.div_ceil(8192));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_file_aborts_before_connecting() {
        let orch = orchestrator(vec![Script::Deliver]);
        let req = UploadRequest::new("/nonexistent/Benchy.gcode.3mf", "printer", "bblp", "x", "Benchy.gcode.3mf");
        let failure = orch.upload(&req, 3, |_| {}).await.unwrap_err();
        assert!(failure.attempts().is_empty());
        assert_eq!(orch.factory.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn request_debug_hides_password() {
        let req = UploadRequest::new("a.gcode.3mf", "printer", "bblp", "secret-code", "a.gcode.3mf");
        let shown = format!("{req:?}");
        assert!(!shown.contains("secret-code"));
        assert_eq!(req.port, 990);
    }
}
