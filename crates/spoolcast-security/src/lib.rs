// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// spoolcast-security: TLS trust for LAN printers and archive fingerprints.
//
// The printer CA is loaded once into a `TlsContext` that both the FTPS upload
// and the MQTT control channel share.

pub mod integrity;
pub mod tls;

pub use integrity::{hash_bytes, hash_file};
pub use tls::{TlsContext, TlsContextProvider};
