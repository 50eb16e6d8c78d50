// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// spoolcast-project: project-file handling for the Spoolcast pipeline.
//
// Unpacks 3MF projects, runs the external slicer over them, and packages the
// sliced result as a `.gcode.3mf` archive the printer can start from.

pub mod archive;
pub mod slicer;

// Re-export the primary entry points so callers can use `spoolcast_project::extract` etc.
pub use archive::{extract, relocate_into_metadata, repackage, sliced_archive_path};
pub use slicer::Slicer;
