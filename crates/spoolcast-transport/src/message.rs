// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print command construction.
//
// The command is a user-supplied JSON template whose `print` object is
// pointed at the uploaded file. Everything else in the template (plate,
// calibration flags, AMS mapping) passes through untouched.

use std::path::Path;

use serde_json::Value;

use spoolcast_core::error::{Result, SpoolcastError};
use spoolcast_core::types::{SDCARD_URL_PREFIX, SLICED_ARCHIVE_SUFFIX};

/// A print command ready to publish. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    body: Value,
}

impl ControlMessage {
    /// Load the template at `path` and fill it in for `delivered_filename`.
    pub fn from_template_file(path: &Path, delivered_filename: &str) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| {
            SpoolcastError::Configuration(format!(
                "cannot read message template {}: {e}",
                path.display()
            ))
        })?;
        let template: Value = serde_json::from_slice(&raw).map_err(|e| {
            SpoolcastError::Configuration(format!(
                "message template {} is not JSON: {e}",
                path.display()
            ))
        })?;
        Self::from_template(template, delivered_filename)
    }

    /// Fill in `print.url` and `print.subtask_name`.
    pub fn from_template(mut template: Value, delivered_filename: &str) -> Result<Self> {
        let print = template
            .get_mut("print")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                SpoolcastError::Configuration(
                    "message template must contain a `print` object".into(),
                )
            })?;
        print.insert("url".into(), Value::String(sdcard_url(delivered_filename)));
        print.insert(
            "subtask_name".into(),
            Value::String(task_name(delivered_filename).to_owned()),
        );
        Ok(Self { body: template })
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Serialized message body.
    pub fn payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.body)?)
    }
}

/// Where the printer finds an uploaded file.
pub fn sdcard_url(delivered_filename: &str) -> String {
    format!("{SDCARD_URL_PREFIX}{delivered_filename}")
}

/// Display name of a print: the file name without `.gcode.3mf`.
pub fn task_name(delivered_filename: &str) -> &str {
    delivered_filename
        .strip_suffix(SLICED_ARCHIVE_SUFFIX)
        .unwrap_or(delivered_filename)
}

/// Topic the printer listens on for commands.
pub fn request_topic(serial: &str) -> String {
    format!("device/{serial}/request")
}
