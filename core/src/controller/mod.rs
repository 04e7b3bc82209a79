//! The control-state machine tying settings, environment checks, the process
//! supervisor and the artifact listing into one operator session.

mod session;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

pub use session::{build_invocation, InvocationOptions, HEADLESS_ENV};

use crate::artifacts::{ArtifactIndex, ArtifactRepository, Preview};
use crate::config::AppConfig;
use crate::env_check::{EnvironmentReport, EnvironmentValidator};
use crate::error::{ControllerError, ErrorKind, SupervisorError};
use crate::runner::{
    LogLine, LogPoll, LogSubscription, ProcessSupervisor, RunSummary, RunnerPlugin, SessionHandle,
    SupervisorEvent, SupervisorSettings,
};
use crate::settings::{parse_targets_input, ConfigDocument, ConfigStore, PatchMode};
use crate::state::{
    ControlState, ControllerEvent, RunRequest, RunSession, Stage, StateTransition,
};

/// New output and, when a run ended during this call, its final session.
#[derive(Debug, Default)]
pub struct Progress {
    pub lines: Vec<LogLine>,
    pub finished: Option<RunSession>,
}

impl Progress {
    fn merge(&mut self, other: Progress) {
        self.lines.extend(other.lines);
        if other.finished.is_some() {
            self.finished = other.finished;
        }
    }
}

enum Wake {
    Line(Option<LogLine>),
    Event(Option<SupervisorEvent>),
}

/// Builds a request from raw operator input: a stage name and comma-separated targets.
pub fn parse_request(
    stage: &str,
    targets_input: &str,
    headless: bool,
) -> Result<RunRequest, ControllerError> {
    let stage: Stage = stage
        .parse()
        .map_err(|_| ControllerError::UnknownStage(stage.to_string()))?;
    Ok(RunRequest {
        stage,
        targets: parse_targets_input(targets_input),
        headless,
    })
}

pub struct OrchestrationController {
    invocation: InvocationOptions,
    store: ConfigStore,
    validator: EnvironmentValidator,
    artifacts: ArtifactRepository,
    supervisor: ProcessSupervisor,
    supervisor_events: mpsc::UnboundedReceiver<SupervisorEvent>,
    pending_events: VecDeque<SupervisorEvent>,

    state: ControlState,
    run_enabled: bool,
    report: Option<EnvironmentReport>,
    session: Option<RunSession>,
    handle: Option<SessionHandle>,
    cursor: Option<LogSubscription>,
    history: VecDeque<LogLine>,
    history_limit: usize,
    status: String,
    last_error: Option<(ErrorKind, String)>,
    events_tx: broadcast::Sender<ControllerEvent>,
}

impl OrchestrationController {
    pub fn new(
        invocation: InvocationOptions,
        store: ConfigStore,
        validator: EnvironmentValidator,
        artifacts: ArtifactRepository,
        plugin: Arc<dyn RunnerPlugin>,
        supervisor_settings: SupervisorSettings,
        history_limit: usize,
    ) -> Self {
        let (supervisor, supervisor_events) = ProcessSupervisor::new(plugin, supervisor_settings);
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            invocation,
            store,
            validator,
            artifacts,
            supervisor,
            supervisor_events,
            pending_events: VecDeque::new(),
            state: ControlState::Idle,
            run_enabled: false,
            report: None,
            session: None,
            handle: None,
            cursor: None,
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
            status: "Starting up".to_string(),
            last_error: None,
            events_tx,
        }
    }

    pub fn from_config(cfg: &AppConfig, plugin: Arc<dyn RunnerPlugin>) -> Self {
        Self::new(
            InvocationOptions::from_config(cfg),
            ConfigStore::from_config(cfg),
            EnvironmentValidator::from_config(cfg),
            ArtifactRepository::from_config(cfg),
            plugin,
            SupervisorSettings::from(&cfg.control),
            cfg.control.history_lines,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events_tx.subscribe()
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn run_enabled(&self) -> bool {
        self.run_enabled
    }

    pub fn report(&self) -> Option<&EnvironmentReport> {
        self.report.as_ref()
    }

    /// The current run, or the last one until the next run replaces it.
    pub fn session(&self) -> Option<&RunSession> {
        self.session.as_ref()
    }

    pub fn history(&self) -> &VecDeque<LogLine> {
        &self.history
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn last_error(&self) -> Option<&(ErrorKind, String)> {
        self.last_error.as_ref()
    }

    pub fn artifacts(&self) -> &ArtifactIndex {
        self.artifacts.index()
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn validator(&self) -> &EnvironmentValidator {
        &self.validator
    }

    /// IDLE -> VALIDATING -> READY, then an initial artifact listing.
    pub async fn start_up(&mut self) -> Result<(), ControllerError> {
        if self.state != ControlState::Idle {
            return Err(ControllerError::InvalidState {
                action: "start-up",
                state: self.state,
            });
        }
        self.validate().await;
        self.refresh_artifacts_quietly();
        Ok(())
    }

    /// READY -> VALIDATING -> READY. Refused while a run is active.
    pub async fn revalidate(&mut self) -> Result<&EnvironmentReport, ControllerError> {
        if self.state != ControlState::Ready {
            let err = ControllerError::InvalidState {
                action: "revalidate",
                state: self.state,
            };
            self.record_error(&err);
            return Err(err);
        }
        self.validate().await;
        match self.report.as_ref() {
            Some(r) => Ok(r),
            None => Err(ControllerError::InvalidState {
                action: "revalidate",
                state: self.state,
            }),
        }
    }

    async fn validate(&mut self) {
        self.transition(ControlState::Validating);
        self.set_status("Checking environment");

        let report = self.validator.check_async().await;
        self.run_enabled = report.all_ok();
        self.emit(ControllerEvent::EnvironmentChecked(report.clone()));
        let failed = report.failed();
        self.report = Some(report);

        self.advance();
        if self.run_enabled {
            self.last_error = None;
            self.set_status("Environment OK. Ready to run.");
        } else {
            self.record_error(&ControllerError::EnvironmentBlocked { failed });
        }
    }

    /// READY -> RUNNING: patch the target list (if any), then launch.
    ///
    /// Any failure before launch leaves the controller in READY with the
    /// error surfaced; the process is not started.
    pub async fn request_run(&mut self, request: RunRequest) -> Result<&RunSession, ControllerError> {
        if let Err(err) = self.check_can_run() {
            self.record_error(&err);
            return Err(err);
        }

        match self.store.apply_targets(&request.targets) {
            Ok(outcome) => {
                if outcome.mode != PatchMode::Unchanged {
                    tracing::info!(
                        targets = request.targets.len(),
                        mode = ?outcome.mode,
                        path = %self.store.path().display(),
                        "target list patched"
                    );
                }
            }
            Err(e) => {
                let err = ControllerError::from(e);
                self.record_error(&err);
                return Err(err);
            }
        }

        let invocation = build_invocation(&self.invocation, &request);
        let handle = match self.supervisor.start(invocation).await {
            Ok(h) => h,
            Err(e) => {
                let err = ControllerError::from(e);
                self.record_error(&err);
                return Err(err);
            }
        };

        let session = RunSession::started(handle.id(), request, handle.started_at());
        self.history.clear();
        self.cursor = Some(handle.stream());
        self.handle = Some(handle);
        self.last_error = None;
        self.transition(ControlState::Running);
        self.set_status(format!(
            "Running stage `{}` (session {})",
            session.request.stage,
            short_id(&session.id)
        ));
        self.emit(ControllerEvent::RunStarted(session.clone()));
        Ok(self.session.insert(session))
    }

    fn check_can_run(&self) -> Result<(), ControllerError> {
        match self.state {
            ControlState::Running => {
                let active = self
                    .session
                    .as_ref()
                    .map(|s| s.id.clone())
                    .unwrap_or_default();
                Err(SupervisorError::ConcurrentRun { active }.into())
            }
            ControlState::Ready if !self.run_enabled => Err(ControllerError::EnvironmentBlocked {
                failed: self.report.as_ref().map(|r| r.failed()).unwrap_or_default(),
            }),
            ControlState::Ready => Ok(()),
            state => Err(ControllerError::InvalidState {
                action: "run",
                state,
            }),
        }
    }

    /// Interrupts the active run. The run then ends as FAIL with the cancelled flag.
    pub fn cancel_run(&mut self) -> Result<(), ControllerError> {
        let handle = match (&self.state, self.handle.as_ref()) {
            (ControlState::Running, Some(h)) => h.clone(),
            _ => {
                let err = ControllerError::InvalidState {
                    action: "cancel",
                    state: self.state,
                };
                self.record_error(&err);
                return Err(err);
            }
        };
        self.supervisor.cancel(&handle)?;
        self.set_status("Cancelling: interrupt sent, waiting for the pipeline to stop");
        Ok(())
    }

    /// Non-blocking: collects new output and handles a finished run.
    pub fn poll(&mut self) -> Progress {
        let mut progress = Progress {
            lines: self.drain_lines(),
            finished: None,
        };
        while let Ok(ev) = self.supervisor_events.try_recv() {
            self.pending_events.push_back(ev);
        }
        while let Some(ev) = self.pending_events.pop_front() {
            if let SupervisorEvent::Exited(summary) = ev {
                // Everything the session wrote is in the log before it reports exit.
                progress.lines.extend(self.drain_lines());
                if let Some(done) = self.on_exit(summary) {
                    progress.finished = Some(done);
                }
            }
        }
        progress
    }

    /// Waits until there is new output or the run ends. Returns at once when idle.
    pub async fn step(&mut self) -> Progress {
        if self.state != ControlState::Running {
            return self.poll();
        }

        let wake = {
            let events = &mut self.supervisor_events;
            let cursor = self.cursor.as_mut();
            tokio::select! {
                ev = events.recv() => Wake::Event(ev),
                line = async move {
                    match cursor {
                        Some(c) => c.next().await,
                        None => std::future::pending().await,
                    }
                } => Wake::Line(line),
            }
        };

        let mut progress = Progress::default();
        match wake {
            Wake::Line(Some(line)) => {
                self.remember(line.clone());
                progress.lines.push(line);
            }
            // Log closed; the exit event is on its way.
            Wake::Line(None) => self.cursor = None,
            Wake::Event(Some(ev)) => self.pending_events.push_back(ev),
            Wake::Event(None) => {
                tracing::error!("supervisor event channel closed");
            }
        }
        progress.merge(self.poll());
        progress
    }

    /// Drives the active run to completion, handing each line to `on_line`.
    pub async fn run_until_settled<F>(&mut self, mut on_line: F) -> Option<RunSession>
    where
        F: FnMut(&LogLine),
    {
        loop {
            let progress = self.step().await;
            for line in &progress.lines {
                on_line(line);
            }
            if progress.finished.is_some() {
                return progress.finished;
            }
            if self.state != ControlState::Running {
                return None;
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<LogLine> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        loop {
            match cursor.try_next() {
                LogPoll::Line(line) => out.push(line),
                LogPoll::Pending => break,
                LogPoll::Finished => {
                    self.cursor = None;
                    break;
                }
            }
        }
        for line in &out {
            self.remember(line.clone());
        }
        out
    }

    fn remember(&mut self, line: LogLine) {
        self.history.push_back(line);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// RUNNING -> SUCCESS|FAIL -> READY, refreshing artifacts in between.
    fn on_exit(&mut self, summary: RunSummary) -> Option<RunSession> {
        let current = self.session.as_ref()?;
        if current.id != summary.session_id || self.state != ControlState::Running {
            tracing::debug!(session_id = %summary.session_id, "ignoring exit of a stale session");
            return None;
        }

        let finished = current.finished(summary);
        let outcome = finished.outcome;
        self.session = Some(finished.clone());
        self.handle = None;

        let terminal = if outcome.map(|o| o.is_success()).unwrap_or(false) {
            ControlState::Success
        } else {
            ControlState::Fail
        };
        self.transition(terminal);
        self.emit(ControllerEvent::RunFinished(finished.clone()));

        let stage = finished.request.stage;
        let duration = finished
            .summary
            .as_ref()
            .map(|s| format_duration(s.duration_ms))
            .unwrap_or_default();
        let message = match outcome {
            Some(o) if o.is_success() => format!("Stage `{stage}` succeeded in {duration}"),
            Some(o) if o.is_cancelled() => format!("Stage `{stage}` {o} after {duration}"),
            Some(o) => format!("Stage `{stage}` failed: {o} after {duration}"),
            None => format!("Stage `{stage}` ended"),
        };
        match outcome {
            Some(o) if o.is_success() => tracing::info!(session_id = %finished.id, outcome = %o, "run succeeded"),
            Some(o) => tracing::warn!(session_id = %finished.id, outcome = %o, "run failed"),
            None => {}
        }

        if StateTransition::is_terminal(self.state) {
            self.refresh_artifacts_quietly();
        }
        self.advance();
        self.set_status(message);
        Some(finished)
    }

    /// Full re-scan. On failure the previous listing stays and the error is surfaced.
    pub fn refresh_artifacts(&mut self) -> Result<&ArtifactIndex, ControllerError> {
        match self.artifacts.refresh() {
            Ok(index) => {
                let files = index.len();
                self.emit(ControllerEvent::ArtifactsRefreshed { files });
                Ok(self.artifacts.index())
            }
            Err(e) => {
                let err = ControllerError::from(e);
                self.record_error(&err);
                Err(err)
            }
        }
    }

    fn refresh_artifacts_quietly(&mut self) {
        let _ = self.refresh_artifacts();
    }

    pub fn preview(&self, path: &Path) -> Result<Preview, ControllerError> {
        self.artifacts.preview(path).map_err(|e| {
            tracing::warn!(error.kind = ErrorKind::Preview.as_str(), error = %e, "preview failed");
            ControllerError::from(e)
        })
    }

    /// Current settings text for the editor.
    pub fn settings_document(&self) -> Result<ConfigDocument, ControllerError> {
        Ok(self.store.load()?)
    }

    /// Saves edited settings. Invalid YAML is rejected with the parser's
    /// message and nothing is written. Not allowed while a run is active.
    pub fn save_settings_text(&mut self, text: &str) -> Result<(), ControllerError> {
        if self.state == ControlState::Running {
            let err = ControllerError::InvalidState {
                action: "save settings",
                state: self.state,
            };
            self.record_error(&err);
            return Err(err);
        }
        match self.store.save_text(text) {
            Ok(_) => {
                self.set_status(format!("Saved {}", self.store.path().display()));
                Ok(())
            }
            Err(e) => {
                let err = ControllerError::from(e);
                self.record_error(&err);
                Err(err)
            }
        }
    }

    fn transition(&mut self, to: ControlState) {
        let from = self.state;
        if let Err(e) = StateTransition::validate(from, to) {
            tracing::error!(error = %e, "rejected state transition");
            return;
        }
        tracing::debug!(from = %from, to = %to, "state transition");
        self.state = to;
        self.emit(ControllerEvent::StateChanged { from, to });
    }

    /// Takes the automatic step out of the current state, if it has one.
    fn advance(&mut self) {
        if let Some(next) = StateTransition::next_phase(self.state) {
            self.transition(next);
        }
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.emit(ControllerEvent::Status(self.status.clone()));
    }

    fn record_error(&mut self, err: &ControllerError) {
        let kind = err.kind();
        let message = err.user_message();
        tracing::warn!(error.kind = kind.as_str(), error.message = %err, "operation failed");
        self.last_error = Some((kind, message.clone()));
        self.status = message.clone();
        self.emit(ControllerEvent::Error { kind, message });
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events_tx.send(event);
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}
