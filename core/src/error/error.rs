use thiserror::Error;

use super::controller::ControllerError;
use super::settings::SettingsError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("controller: {0}")]
    Controller(#[from] ControllerError),
    #[error("settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("a pipeline run is already active (session {active})")]
    ConcurrentRun { active: String },
    #[error("failed to launch `{program}`: {reason}")]
    Launch { program: String, reason: String },
    #[error("no active process to cancel")]
    NotRunning,
    #[error("stream io error: {stream} {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },
}
