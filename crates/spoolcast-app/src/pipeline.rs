// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Slice-and-print pipeline: extract, slice, relocate, repackage,
// fingerprint, upload, publish. Stages run strictly in order and the first
// failure stops the run; nothing is published after a failed upload.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, instrument};

use spoolcast_core::error::{Result, SpoolcastError};
use spoolcast_core::types::{DeliveryReport, JobId, JobStage, TransferProgress};
use spoolcast_core::AppConfig;
use spoolcast_project::{extract, relocate_into_metadata, repackage, sliced_archive_path, Slicer};
use spoolcast_security::hash_file;

use crate::services::app_services::AppContext;

/// A sliced archive ready for upload.
#[derive(Debug, Clone)]
pub struct PreparedArchive {
    pub path: PathBuf,
    /// Name the printer stores it under.
    pub remote_name: String,
    pub sha256: String,
}

/// Run every stage for `input` and report what reached the printer.
#[instrument(skip(ctx, on_progress), fields(input = %input.display()))]
pub async fn run(
    ctx: &AppContext,
    input: &Path,
    on_progress: impl FnMut(TransferProgress),
) -> Result<DeliveryReport> {
    let job_id = JobId::new();
    let started_at = Utc::now();
    info!(%job_id, "job started");

    let archive = prepare(ctx.config(), input).await?;

    info!(stage = %JobStage::Upload, remote = %archive.remote_name, "uploading");
    let upload = ctx.upload(&archive.path, &archive.remote_name, on_progress).await?;

    info!(stage = %JobStage::Publish, "starting print");
    ctx.publish(&archive.remote_name, None).await?;

    let report = DeliveryReport {
        job_id,
        archive_name: archive.remote_name,
        archive_sha256: archive.sha256,
        bytes_uploaded: upload.bytes_transferred,
        upload_attempts: upload.attempts.len() as u32,
        assumed_delivered: upload.assumed_delivered,
        started_at,
        finished_at: Utc::now(),
    };
    info!(%job_id, bytes = report.bytes_uploaded, "job finished");
    Ok(report)
}

/// Local half of the pipeline: everything up to the upload.
pub async fn prepare(config: &AppConfig, input: &Path) -> Result<PreparedArchive> {
    let output = sliced_archive_path(input)?;
    let remote_name = output
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            SpoolcastError::Archive(format!("{} has no usable file name", output.display()))
        })?;

    info!(stage = %JobStage::Extract, folder = %config.extract_folder.display(), "extracting");
    let (archive, folder) = (input.to_path_buf(), config.extract_folder.clone());
    blocking(move || extract(&archive, &folder)).await?;

    info!(stage = %JobStage::Slice, "slicing");
    let slicer = Slicer::new(
        &config.slicer_path,
        config.settings_files.clone(),
        &config.output_dir,
    );
    slicer.slice(input).await?;

    info!(stage = %JobStage::Package, output = %output.display(), "packaging");
    let gcode = slicer.output_dir().join(&config.output_gcode);
    let folder = config.extract_folder.clone();
    let target = output.clone();
    let path = blocking(move || {
        relocate_into_metadata(&gcode, &folder)?;
        repackage(&folder, &target)
    })
    .await?;

    let hashed = path.clone();
    let sha256 = blocking(move || hash_file(&hashed)).await?;
    info!(sha256 = %sha256, "archive fingerprint");

    Ok(PreparedArchive {
        path,
        remote_name,
        sha256,
    })
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SpoolcastError::Io(io::Error::other(e)))?
}
