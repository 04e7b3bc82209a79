use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::env_check::EnvironmentReport;
use crate::error::ErrorKind;
use crate::runner::{ExitOutcome, RunSummary};

/// Controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlState {
    Idle,
    Validating,
    Ready,
    Running,
    Success,
    Fail,
}

impl ControlState {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlState::Idle => "IDLE",
            ControlState::Validating => "VALIDATING",
            ControlState::Ready => "READY",
            ControlState::Running => "RUNNING",
            ControlState::Success => "SUCCESS",
            ControlState::Fail => "FAIL",
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage, passed to the executable as its positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    All,
    Scrape,
    Analyze,
    Visualize,
    Report,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::All,
        Stage::Scrape,
        Stage::Analyze,
        Stage::Visualize,
        Stage::Report,
    ];

    /// The argument the executable understands.
    pub fn as_arg(self) -> &'static str {
        match self {
            Stage::All => "all",
            Stage::Scrape => "scrape",
            Stage::Analyze => "analyze",
            Stage::Visualize => "visualize",
            Stage::Report => "report",
        }
    }

    pub fn next(self) -> Stage {
        let i = Stage::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Stage::ALL[(i + 1) % Stage::ALL.len()]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Stage::All),
            // The executable calls it `scrape`; operators often say `collect`.
            "scrape" | "collect" => Ok(Stage::Scrape),
            "analyze" => Ok(Stage::Analyze),
            "visualize" => Ok(Stage::Visualize),
            "report" => Ok(Stage::Report),
            _ => Err(UnknownStage(s.to_string())),
        }
    }
}

/// What the operator asked for. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRequest {
    pub stage: Stage,
    pub targets: Vec<String>,
    pub headless: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
}

/// The current or most recent run. Replaced wholesale, never patched in place
/// from outside the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSession {
    pub id: String,
    pub request: RunRequest,
    pub started_at: DateTime<Utc>,
    pub state: RunState,
    pub outcome: Option<ExitOutcome>,
    pub summary: Option<RunSummary>,
}

impl RunSession {
    pub fn started(id: impl Into<String>, request: RunRequest, started_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            request,
            started_at,
            state: RunState::Running,
            outcome: None,
            summary: None,
        }
    }

    /// A new value describing this session after it ended.
    pub fn finished(&self, summary: RunSummary) -> Self {
        let state = if summary.outcome.is_success() {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        Self {
            state,
            outcome: Some(summary.outcome),
            summary: Some(summary),
            ..self.clone()
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.outcome.and_then(|o| o.code())
    }

    pub fn cancelled(&self) -> bool {
        self.outcome.map(|o| o.is_cancelled()).unwrap_or(false)
    }
}

/// Notifications for whatever renders the panel.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    StateChanged {
        from: ControlState,
        to: ControlState,
    },
    EnvironmentChecked(EnvironmentReport),
    RunStarted(RunSession),
    RunFinished(RunSession),
    ArtifactsRefreshed { files: usize },
    Status(String),
    Error { kind: ErrorKind, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_parsing_accepts_collect_alias() {
        assert_eq!("collect".parse::<Stage>(), Ok(Stage::Scrape));
        assert_eq!(" Analyze ".parse::<Stage>(), Ok(Stage::Analyze));
        assert_eq!(Stage::Scrape.as_arg(), "scrape");
        assert!("deploy".parse::<Stage>().is_err());
        assert!("".parse::<Stage>().is_err());
    }

    #[test]
    fn finished_session_keeps_request_and_code() {
        let req = RunRequest {
            stage: Stage::Analyze,
            targets: vec![],
            headless: true,
        };
        let running = RunSession::started("s1", req.clone(), Utc::now());
        let done = running.finished(RunSummary {
            session_id: "s1".into(),
            outcome: ExitOutcome::Code(1),
            duration_ms: 10,
            lines: 3,
            dropped_lines: 0,
        });
        assert_eq!(done.state, RunState::Failed);
        assert_eq!(done.exit_code(), Some(1));
        assert!(!done.cancelled());
        assert_eq!(done.request, req);
        assert_eq!(running.state, RunState::Running);
    }

    #[test]
    fn stage_cycles() {
        assert_eq!(Stage::Report.next(), Stage::All);
        assert_eq!(Stage::All.next(), Stage::Scrape);
    }
}
