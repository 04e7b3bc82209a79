use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::config::ControlConfig;

/// What the plugin observed when the child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    /// Terminating signal number, on platforms that have them.
    pub signal: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Signal {
    Interrupt,
    Kill,
}

#[derive(Debug, Clone, Default)]
pub struct RunnerStartArgs {
    pub program: String,
    pub args: Vec<String>,
    /// Overlay on top of the inherited environment.
    pub envs: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// How a session ended, as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExitOutcome {
    Code(i32),
    Signal(i32),
    Cancelled,
    TimedOut,
}

impl ExitOutcome {
    pub fn from_run(outcome: RunOutcome) -> Self {
        match (outcome.exit_code, outcome.signal) {
            (Some(code), _) => ExitOutcome::Code(code),
            (None, Some(sig)) => ExitOutcome::Signal(sig),
            (None, None) => ExitOutcome::Code(-1),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Code(0))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExitOutcome::Cancelled | ExitOutcome::TimedOut)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Code(c) => Some(*c),
            _ => None,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Code(c) => write!(f, "exit code {c}"),
            ExitOutcome::Signal(s) => write!(f, "terminated by signal {s}"),
            ExitOutcome::Cancelled => f.write_str("cancelled"),
            ExitOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CancelReason {
    Operator,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub session_id: String,
    pub outcome: ExitOutcome,
    pub duration_ms: u64,
    pub lines: u64,
    pub dropped_lines: u64,
}

/// Lifecycle notifications. The supervisor is the only producer.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    Started { session_id: String, pid: Option<u32> },
    Exited(RunSummary),
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub line_channel_capacity: usize,
    pub max_line_bytes: usize,
    pub log_retention_lines: usize,
    pub cancel_grace: Duration,
    pub kill_wait: Duration,
    pub run_timeout: Duration,
    pub drain_timeout: Duration,
}

impl From<&ControlConfig> for SupervisorSettings {
    fn from(cfg: &ControlConfig) -> Self {
        Self {
            line_channel_capacity: cfg.line_channel_capacity.max(1),
            max_line_bytes: cfg.max_line_bytes,
            log_retention_lines: cfg.log_retention_lines.max(1),
            cancel_grace: Duration::from_millis(cfg.cancel_grace_ms),
            kill_wait: Duration::from_millis(cfg.kill_wait_ms),
            run_timeout: Duration::from_secs(cfg.run_timeout_secs),
            drain_timeout: Duration::from_millis(cfg.drain_timeout_ms),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&ControlConfig::default())
    }
}
