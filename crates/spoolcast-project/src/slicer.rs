// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External slicer invocation.
//
// The slicer is a command-line program (Bambu Studio / Orca Slicer style):
//   <slicer> --load-settings <s1> [--load-settings <s2> ...]
//            --outputdir <dir> --slice 1 <project.3mf>
// Arguments are passed directly, never through a shell.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use spoolcast_core::error::{Result, SpoolcastError};

/// Plate to slice; single-plate projects only.
const PLATE: &str = "1";

/// How much of the slicer's stderr to keep in an error.
const STDERR_TAIL: usize = 2048;

/// A configured slicer.
#[derive(Debug, Clone)]
pub struct Slicer {
    program: PathBuf,
    settings_files: Vec<PathBuf>,
    output_dir: PathBuf,
}

impl Slicer {
    pub fn new(
        program: impl Into<PathBuf>,
        settings_files: Vec<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            settings_files,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Argument list for slicing `project`.
    pub fn args(&self, project: &Path) -> Vec<OsString> {
        let mut args = Vec::with_capacity(self.settings_files.len() * 2 + 5);
        for settings in &self.settings_files {
            args.push("--load-settings".into());
            args.push(settings.as_os_str().to_owned());
        }
        args.push("--outputdir".into());
        args.push(self.output_dir.as_os_str().to_owned());
        args.push("--slice".into());
        args.push(PLATE.into());
        args.push(project.as_os_str().to_owned());
        args
    }

    /// Run the slicer on `project` and wait for it to finish.
    #[instrument(skip(self), fields(slicer = %self.program.display()))]
    pub async fn slice(&self, project: &Path) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let args = self.args(project);
        debug!(?args, "starting slicer");
        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SpoolcastError::Slicer(format!(
                    "cannot start {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = tail_chars(stderr.trim(), STDERR_TAIL);
            warn!(status = %output.status, "slicer failed");
            return Err(SpoolcastError::Slicer(format!(
                "{} exited with {}: {tail}",
                self.program.display(),
                output.status
            )));
        }

        info!(project = %project.display(), "project sliced");
        Ok(())
    }
}

fn tail_chars(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    let skip = count - max;
    let start = s.char_indices().nth(skip).map_or(0, |(i, _)| i);
    &s[start..]
}
