use thiserror::Error;

use super::artifact::{ArtifactError, PreviewError};
use super::error::SupervisorError;
use super::settings::SettingsError;
use crate::state::ControlState;

/// Operator-facing error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Validation,
    Read,
    Write,
    EnvironmentCheckFailure,
    ConcurrentRun,
    ProcessLaunch,
    Preview,
    InvalidState,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse_error",
            Self::Validation => "validation_error",
            Self::Read => "read_error",
            Self::Write => "write_error",
            Self::EnvironmentCheckFailure => "environment_check_failure",
            Self::ConcurrentRun => "concurrent_run",
            Self::ProcessLaunch => "process_launch_error",
            Self::Preview => "preview_error",
            Self::InvalidState => "invalid_state",
            Self::Internal => "internal",
        }
    }
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("environment checks failed: {}", .failed.join(", "))]
    EnvironmentBlocked { failed: Vec<String> },

    #[error("unknown stage `{0}` (expected one of: all, scrape, collect, analyze, visualize, report)")]
    UnknownStage(String),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("{action} is not allowed while {state}")]
    InvalidState {
        action: &'static str,
        state: ControlState,
    },

    #[error(transparent)]
    Preview(#[from] PreviewError),

    #[error(transparent)]
    Artifacts(#[from] ArtifactError),
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Settings(SettingsError::Parse { .. }) => ErrorKind::Parse,
            Self::Settings(SettingsError::Validation(_)) => ErrorKind::Validation,
            Self::Settings(SettingsError::Write { .. }) => ErrorKind::Write,
            Self::Settings(SettingsError::Serialize(_)) => ErrorKind::Write,
            Self::Settings(SettingsError::Read { .. }) => ErrorKind::Read,
            Self::EnvironmentBlocked { .. } => ErrorKind::EnvironmentCheckFailure,
            Self::UnknownStage(_) => ErrorKind::Validation,
            Self::Supervisor(SupervisorError::ConcurrentRun { .. }) => ErrorKind::ConcurrentRun,
            Self::Supervisor(SupervisorError::Launch { .. }) => ErrorKind::ProcessLaunch,
            Self::Supervisor(_) => ErrorKind::Internal,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Preview(_) => ErrorKind::Preview,
            Self::Artifacts(_) => ErrorKind::Internal,
        }
    }

    /// Status-line text for the operator, with a remediation hint where one exists.
    pub fn user_message(&self) -> String {
        match self {
            Self::EnvironmentBlocked { failed } => format!(
                "Run disabled: {} failed. Install the missing binaries or fix output directory permissions, then revalidate.",
                failed.join(", ")
            ),
            Self::Settings(SettingsError::Parse { .. }) => {
                format!("Settings not saved and run blocked: {self}")
            }
            Self::Supervisor(SupervisorError::ConcurrentRun { .. }) => {
                "A run is already in progress; cancel it or wait for it to finish.".to_string()
            }
            Self::Supervisor(SupervisorError::Launch { program, reason }) => format!(
                "Could not start `{program}` ({reason}). Check [pipeline].program in the panel config."
            ),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn unreadable_settings_are_not_reported_as_parse_errors() {
        let err = ControllerError::Settings(SettingsError::Read {
            path: PathBuf::from("settings.yaml"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert_eq!(err.kind(), ErrorKind::Read);
        assert_eq!(err.kind().as_str(), "read_error");
        assert!(!err.user_message().starts_with("Settings not saved"));
    }

    #[test]
    fn parse_errors_block_save_and_run() {
        let err = ControllerError::Settings(SettingsError::Parse {
            message: "did not find expected ','".into(),
            line: Some(2),
            column: Some(3),
        });
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.user_message().starts_with("Settings not saved and run blocked"));
    }
}
