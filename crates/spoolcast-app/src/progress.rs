// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Terminal progress for uploads and the slow pipeline stages.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use spoolcast_core::types::TransferProgress;

const BAR_TEMPLATE: &str = "{msg} [{bar:32.cyan/blue}] {bytes}/{total_bytes} ({eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg}";

/// Byte progress of an upload. A retry rewinds the bar to zero.
pub struct UploadProgressBar {
    bar: ProgressBar,
}

impl UploadProgressBar {
    pub fn new(label: &str) -> Self {
        Self::with_bar(ProgressBar::new(0), label)
    }

    /// Wrap an existing bar, e.g. a hidden one.
    pub fn with_bar(bar: ProgressBar, label: &str) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .map(|s| s.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(label.to_owned());
        Self { bar }
    }

    pub fn update(&self, progress: TransferProgress) {
        if self.bar.length() != Some(progress.total_bytes) {
            self.bar.set_length(progress.total_bytes);
        }
        self.bar.set_position(progress.bytes_sent);
    }

    pub fn finish(&self, msg: &str) {
        self.bar.finish_with_message(msg.to_owned());
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

/// Spinner for a stage with no byte count (extract, slice, publish).
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
