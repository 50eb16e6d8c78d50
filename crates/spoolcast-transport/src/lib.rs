// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolcast Transport: implicit-FTPS upload with bounded retries, and the
// MQTT print trigger. Both branches share one TLS context from
// `spoolcast-security` and run one after the other.

pub mod ftps;
pub mod message;
pub mod mqtt;
pub mod reply;
pub mod retry;
pub mod session;
pub mod upload;

pub use ftps::{FtpsSessionFactory, SecureTransferClient, SessionState};
pub use message::ControlMessage;
pub use mqtt::{ControlChannelPublisher, PublishTarget, RumqttConnector};
pub use session::{SessionFactory, TransferSession};
pub use upload::{TransferOrchestrator, UploadFailure, UploadReport, UploadRequest};
