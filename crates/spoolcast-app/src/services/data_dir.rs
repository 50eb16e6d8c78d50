// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Settings directory resolution.

use std::path::{Path, PathBuf};

use spoolcast_core::error::Result;
use spoolcast_core::executable_dir;

/// Name of the settings folder shipped next to the executable.
pub const SETTINGS_DIR: &str = "settings";

pub const CONFIG_FILE: &str = "config.json";

/// Default print command template, looked up beside the config file.
pub const MESSAGE_TEMPLATE_FILE: &str = "message.json";

/// Return `settings/` next to the running executable.
pub fn settings_dir() -> Result<PathBuf> {
    Ok(executable_dir()?.join(SETTINGS_DIR))
}

/// `settings/config.json` next to the running executable.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(settings_dir()?.join(CONFIG_FILE))
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_lives_in_settings() {
        let path = default_config_path().expect("exe path");
        assert!(path.ends_with("settings/config.json"));
    }

    #[test]
    fn relative_paths_join_base() {
        let base = Path::new("/opt/spoolcast/settings");
        assert_eq!(
            resolve(base, Path::new("printer-ca.pem")),
            PathBuf::from("/opt/spoolcast/settings/printer-ca.pem")
        );
        assert_eq!(
            resolve(base, Path::new("/etc/printer-ca.pem")),
            PathBuf::from("/etc/printer-ca.pem")
        );
    }
}
