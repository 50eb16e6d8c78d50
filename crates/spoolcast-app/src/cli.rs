// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line surface.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "spoolcast")]
#[command(about = "Slice a 3MF project and start it on a LAN 3D printer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Settings file (default: settings/config.json next to the executable)
    #[arg(long, global = true, env = "SPOOLCAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract, slice, repackage, upload, and start printing a project
    Run {
        /// Project file (.3mf)
        input: PathBuf,
    },

    /// Upload an already sliced archive without starting it
    Upload {
        /// Sliced archive (.gcode.3mf)
        file: PathBuf,

        /// Name on the printer (default: the local file name)
        #[arg(long)]
        remote_name: Option<String>,
    },

    /// Start printing a file already on the printer
    Publish {
        /// File name on the printer's storage
        filename: String,

        /// Print command template (default: from the settings)
        #[arg(long)]
        template: Option<PathBuf>,
    },
}
