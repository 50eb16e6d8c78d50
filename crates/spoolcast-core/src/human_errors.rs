// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the command line.
//
// Every technical error is mapped to plain English with a clear suggestion.

use crate::error::SpoolcastError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip or timeout; running again will probably work.
    Transient,
    /// User must change something (access code, path, settings file).
    ActionRequired,
    /// Retrying will not help: damaged project or broken slicer.
    Permanent,
}

impl Severity {
    /// Heading the command line prints before the message.
    pub fn label(self) -> &'static str {
        match self {
            Self::Transient => "Temporary problem",
            Self::ActionRequired => "Action needed",
            Self::Permanent => "Error",
        }
    }
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary.
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    /// Whether running the command again may succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `SpoolcastError` into a `HumanError`.
pub fn humanize_error(err: &SpoolcastError) -> HumanError {
    match err {
        SpoolcastError::Configuration(detail) => HumanError {
            message: "The settings are incomplete or invalid.".into(),
            suggestion: format!("Check config.json, the printer certificate, and the message template. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        SpoolcastError::ConnectTimeout { addr, .. } => HumanError {
            message: "The printer did not answer.".into(),
            suggestion: format!("Make sure the printer is on, in LAN mode, and reachable at {addr}."),
            retriable: true,
            severity: Severity::Transient,
        },

        SpoolcastError::TransientTransfer(_) | SpoolcastError::Protocol(_) | SpoolcastError::SilentTimeout => HumanError {
            message: "The upload was interrupted.".into(),
            suggestion: "The Wi-Fi link to the printer may be unstable. Try again, or move the printer closer to the access point.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        SpoolcastError::UploadExhausted { attempts } => HumanError {
            message: "The file could not be sent to the printer.".into(),
            suggestion: format!("The connection kept failing ({attempts} tries). Check the printer's Wi-Fi signal and run the command again."),
            retriable: true,
            severity: Severity::Transient,
        },

        SpoolcastError::Auth(_) => HumanError {
            message: "The printer refused the login.".into(),
            suggestion: "Copy the access code from the printer's network settings into config.json (the `password` key).".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        SpoolcastError::Permission { message, .. } => HumanError {
            message: "The printer would not accept the file.".into(),
            suggestion: format!("Check that the SD card is inserted and has free space. ({message})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        SpoolcastError::ProtocolReply { code, .. } => HumanError {
            message: "The printer answered in a way we did not expect.".into(),
            suggestion: format!("Update the printer firmware and try again. (reply code {code})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        SpoolcastError::InvalidSessionState { .. } => HumanError {
            message: "The upload steps ran out of order.".into(),
            suggestion: "This is a bug in spoolcast. Please report it with the log output.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        SpoolcastError::Mqtt(_) | SpoolcastError::PublishExhausted { .. } => HumanError {
            message: "The file was uploaded but the print did not start.".into(),
            suggestion: "Check the serial number and access code, then start the print from the printer's screen or run `spoolcast publish` again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        SpoolcastError::Archive(_) => HumanError {
            message: "The project file could not be read or written.".into(),
            suggestion: "Open the project in your slicer and save it again as a .3mf file.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        SpoolcastError::Slicer(detail) => HumanError {
            message: "Slicing failed.".into(),
            suggestion: format!("Check `slicer_path` and the settings files in config.json. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        SpoolcastError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "A file could not be found.".into(),
                suggestion: format!("Check the paths in config.json. ({io_err})"),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "A file could not be opened.".into(),
                suggestion: "Check that spoolcast may read the project and write the work directories.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "Something went wrong reading or writing a file.".into(),
                suggestion: format!("Try again. ({io_err})"),
                retriable: true,
                severity: Severity::Transient,
            },
        },

        SpoolcastError::Serialization(_) => HumanError {
            message: "A settings file is not valid JSON.".into(),
            suggestion: "Check config.json and the message template for typos.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_points_at_access_code() {
        let h = humanize_error(&SpoolcastError::Auth("530 Login incorrect.".into()));
        assert_eq!(h.severity, Severity::ActionRequired);
        assert!(!h.retriable);
        assert!(h.suggestion.contains("access code"));
    }

    #[test]
    fn connect_timeout_is_retriable() {
        let h = humanize_error(&SpoolcastError::ConnectTimeout {
            addr: "192.168.1.50:990".into(),
            timeout: std::time::Duration::from_secs(2),
        });
        assert!(h.retriable);
        assert!(h.suggestion.contains("192.168.1.50:990"));
    }

    #[test]
    fn severity_sets_the_heading() {
        let h = humanize_error(&SpoolcastError::Slicer("exit 1".into()));
        assert_eq!(h.severity.label(), "Action needed");
        let h = humanize_error(&SpoolcastError::UploadExhausted { attempts: 3 });
        assert_eq!(h.severity.label(), "Temporary problem");
        let h = humanize_error(&SpoolcastError::ProtocolReply {
            code: 421,
            message: "busy".into(),
        });
        assert_eq!(h.severity.label(), "Error");
    }

    #[test]
    fn publish_exhausted_mentions_publish_command() {
        let h = humanize_error(&SpoolcastError::PublishExhausted { attempts: 3 });
        assert!(h.suggestion.contains("spoolcast publish"));
    }
}
