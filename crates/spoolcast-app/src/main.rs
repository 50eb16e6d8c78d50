// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolcast: slice a 3MF project and start it on a LAN 3D printer.
//
// Entry point. Initialises logging, loads the settings, and dispatches the
// requested command.

mod cli;
mod pipeline;
mod progress;
mod services;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use spoolcast_core::error::{Result, SpoolcastError};
use spoolcast_core::human_errors::humanize_error;

use cli::{Cli, Command};
use progress::UploadProgressBar;
use services::app_services::AppContext;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tracing::info!("Spoolcast starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            let human = humanize_error(&err);
            eprintln!("{}: {}", human.severity.label(), human.message);
            eprintln!("  {}", human.suggestion);
            if human.retriable {
                eprintln!("  Running the command again may work.");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = AppContext::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run { input } => {
            let bar = UploadProgressBar::new(&display_name(&input));
            let result = pipeline::run(&ctx, &input, |p| bar.update(p)).await;
            match result {
                Ok(report) => {
                    bar.finish("uploaded");
                    println!(
                        "Printing {} ({} bytes, sha256 {}, {} attempt(s){})",
                        report.archive_name,
                        report.bytes_uploaded,
                        report.archive_sha256,
                        report.upload_attempts,
                        if report.assumed_delivered { ", delivery assumed" } else { "" },
                    );
                    let elapsed = report.finished_at - report.started_at;
                    println!("Job {} done in {}s", report.job_id, elapsed.num_seconds());
                    Ok(())
                }
                Err(e) => {
                    bar.abandon();
                    Err(e)
                }
            }
        }

        Command::Upload { file, remote_name } => {
            let remote_name = match remote_name {
                Some(name) => name,
                None => display_name(&file),
            };
            if remote_name.is_empty() {
                return Err(SpoolcastError::Configuration(format!(
                    "{} has no file name to upload under",
                    file.display()
                )));
            }
            let bar = UploadProgressBar::new(&remote_name);
            let result = ctx.upload(&file, &remote_name, |p| bar.update(p)).await;
            match result {
                Ok(report) => {
                    bar.finish("uploaded");
                    println!(
                        "Uploaded {remote_name} ({} bytes, {} attempt(s))",
                        report.bytes_transferred,
                        report.attempts.len()
                    );
                    Ok(())
                }
                Err(e) => {
                    bar.abandon();
                    Err(e)
                }
            }
        }

        Command::Publish { filename, template } => {
            let spinner = progress::spinner(&format!("Starting {filename}"));
            let result = ctx.publish(&filename, template.as_deref()).await;
            spinner.finish_and_clear();
            result?;
            println!("Print command sent for {filename}");
            Ok(())
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
