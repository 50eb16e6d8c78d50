// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// 3MF project archives: unpack, drop the sliced G-code into `Metadata/`,
// and zip the folder back up as `<name>.gcode.3mf`.
//
// A 3MF file is a plain zip container. The printer only needs the sliced
// G-code under `Metadata/` plus whatever the project already carried.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use spoolcast_core::error::{Result, SpoolcastError};
use spoolcast_core::types::SLICED_ARCHIVE_SUFFIX;

/// Folder inside the archive where the printer looks for G-code.
pub const METADATA_DIR: &str = "Metadata";

const PROJECT_SUFFIX: &str = ".3mf";

/// Unpack `archive` into `dest`, creating it if needed.
///
/// Entries whose names would land outside `dest` are rejected. Returns the
/// number of files written.
#[instrument(skip_all, fields(archive = %archive.display(), dest = %dest.display()))]
pub fn extract(archive: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive).map_err(|e| {
        SpoolcastError::Archive(format!("cannot open {}: {e}", archive.display()))
    })?;
    let mut zip = ZipArchive::new(file).map_err(|e| {
        SpoolcastError::Archive(format!("{} is not a 3MF archive: {e}", archive.display()))
    })?;
    fs::create_dir_all(dest)?;

    let mut written = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(zip_error)?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            SpoolcastError::Archive(format!("entry {:?} escapes the extract folder", entry.name()))
        })?;
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        written += 1;
    }

    info!(files = written, "project extracted");
    Ok(written)
}

/// Move the slicer's output into `<extract_folder>/Metadata/`.
///
/// Returns the new path.
#[instrument(skip_all, fields(gcode = %gcode.display()))]
pub fn relocate_into_metadata(gcode: &Path, extract_folder: &Path) -> Result<PathBuf> {
    let file_name = gcode.file_name().ok_or_else(|| {
        SpoolcastError::Archive(format!("{} has no file name", gcode.display()))
    })?;
    let metadata = extract_folder.join(METADATA_DIR);
    fs::create_dir_all(&metadata)?;
    let target = metadata.join(file_name);

    if fs::rename(gcode, &target).is_err() {
        // Different filesystem.
        fs::copy(gcode, &target)?;
        fs::remove_file(gcode)?;
    }
    debug!(target = %target.display(), "sliced G-code moved into project");
    Ok(target)
}

/// Zip the contents of `folder` into `output`, replacing any existing file.
///
/// Paths inside the archive are relative to `folder` and use `/`.
#[instrument(skip_all, fields(folder = %folder.display(), output = %output.display()))]
pub fn repackage(folder: &Path, output: &Path) -> Result<PathBuf> {
    if output.exists() {
        fs::remove_file(output)?;
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut files = Vec::new();
    collect_files(folder, &mut files)?;
    files.sort();

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(File::create(output)?);
    for path in &files {
        if path == output {
            continue;
        }
        let name = entry_name(folder, path)?;
        zip.start_file(name, options).map_err(zip_error)?;
        io::copy(&mut File::open(path)?, &mut zip)?;
    }
    zip.finish().map_err(zip_error)?;

    info!(entries = files.len(), "sliced archive written");
    Ok(output.to_path_buf())
}

/// `Benchy.3mf` -> `Benchy.gcode.3mf`, next to the input.
pub fn sliced_archive_path(project: &Path) -> Result<PathBuf> {
    let name = project
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            SpoolcastError::Archive(format!("{} has no usable file name", project.display()))
        })?;
    let stem = name
        .strip_suffix(SLICED_ARCHIVE_SUFFIX)
        .or_else(|| name.strip_suffix(PROJECT_SUFFIX))
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| SpoolcastError::Archive(format!("{name} is not a .3mf project")))?;
    Ok(project.with_file_name(format!("{stem}{SLICED_ARCHIVE_SUFFIX}")))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        SpoolcastError::Archive(format!("{} is outside {}", path.display(), root.display()))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn zip_error(e: zip::result::ZipError) -> SpoolcastError {
    SpoolcastError::Archive(e.to_string())
}
