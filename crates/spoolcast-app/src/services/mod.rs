// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: bridges the command line to the spoolcast backend crates.
//
// The application context owns the loaded configuration and the shared TLS
// provider, and hands both to the transport branches.

pub mod app_services;
pub mod data_dir;
