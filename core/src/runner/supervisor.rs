use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::abort;
use super::io_pump::{self, LineTap};
use super::log::{LogStream, SessionLog, LogSubscription};
use super::traits::{RunnerPlugin, RunnerSession};
use super::types::{
    CancelReason, ExitOutcome, RunSummary, RunnerStartArgs, SupervisorEvent, SupervisorSettings,
};
use crate::error::SupervisorError;

enum Slot {
    Idle,
    Starting,
    Active(String),
}

/// Launches the pipeline one child at a time and reports its lifecycle.
pub struct ProcessSupervisor {
    plugin: Arc<dyn RunnerPlugin>,
    settings: SupervisorSettings,
    slot: Arc<Mutex<Slot>>,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
}

/// Caller's view of one launched session. Clones share the session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: String,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    log: SessionLog,
    cancel_tx: mpsc::Sender<CancelReason>,
    exit_rx: watch::Receiver<Option<ExitOutcome>>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// A fresh cursor over this session's lines, starting at seq 0.
    pub fn stream(&self) -> LogSubscription {
        self.log.subscribe()
    }

    /// The outcome, once the child has been reaped and output drained.
    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        *self.exit_rx.borrow()
    }

    /// Resolves when the session ends. Bounded by the supervisor's run timeout.
    pub async fn await_exit(&self) -> ExitOutcome {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(outcome) = *rx.borrow_and_update() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Driver gone without publishing; only happens if it panicked.
                return (*rx.borrow()).unwrap_or(ExitOutcome::Code(-1));
            }
        }
    }
}

impl ProcessSupervisor {
    pub fn new(
        plugin: Arc<dyn RunnerPlugin>,
        settings: SupervisorSettings,
    ) -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                plugin,
                settings,
                slot: Arc::new(Mutex::new(Slot::Idle)),
                events_tx,
            },
            events_rx,
        )
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        !matches!(*lock_slot(&self.slot), Slot::Idle)
    }

    /// Launches the child. Fails with `ConcurrentRun` while another one is alive.
    pub async fn start(&self, args: RunnerStartArgs) -> Result<SessionHandle, SupervisorError> {
        {
            let mut slot = lock_slot(&self.slot);
            match &*slot {
                Slot::Idle => *slot = Slot::Starting,
                Slot::Starting => {
                    return Err(SupervisorError::ConcurrentRun {
                        active: "starting".into(),
                    })
                }
                Slot::Active(id) => {
                    return Err(SupervisorError::ConcurrentRun { active: id.clone() })
                }
            }
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            session_id = %session_id,
            program = %args.program,
            args = ?args.args,
            runner = self.plugin.name(),
            "starting pipeline process"
        );

        let session = match self.plugin.start_session(&args).await {
            Ok(s) => s,
            Err(e) => {
                *lock_slot(&self.slot) = Slot::Idle;
                tracing::error!(error.kind = "process_launch_error", program = %args.program, error = %e);
                return Err(SupervisorError::Launch {
                    program: args.program.clone(),
                    reason: format!("{e:#}"),
                });
            }
        };

        let started = Instant::now();
        let pid = session.pid();
        let log = SessionLog::new(&session_id, self.settings.log_retention_lines, started);
        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        let (exit_tx, exit_rx) = watch::channel(None);

        *lock_slot(&self.slot) = Slot::Active(session_id.clone());
        let _ = self.events_tx.send(SupervisorEvent::Started {
            session_id: session_id.clone(),
            pid,
        });

        tokio::spawn(drive(Driver {
            session,
            session_id: session_id.clone(),
            started,
            log: log.clone(),
            cancel_rx,
            exit_tx,
            slot: self.slot.clone(),
            events_tx: self.events_tx.clone(),
            settings: self.settings.clone(),
        }));

        Ok(SessionHandle {
            id: session_id,
            pid,
            started_at: Utc::now(),
            log,
            cancel_tx,
            exit_rx,
        })
    }

    /// Interrupt, grace period, kill. The exit notification follows with
    /// `ExitOutcome::Cancelled`.
    ///
    /// Cancelling a session that already ended is a no-op. Cancelling when no
    /// process was ever attached to the handle is a logic error.
    pub fn cancel(&self, handle: &SessionHandle) -> Result<(), SupervisorError> {
        let slot = lock_slot(&self.slot);
        if handle.exit_outcome().is_some() {
            tracing::debug!(session_id = %handle.id, "cancel after exit ignored");
            return Ok(());
        }
        let active = matches!(&*slot, Slot::Active(id) if *id == handle.id);
        drop(slot);
        if !active {
            tracing::error!(session_id = %handle.id, "cancel on a session with no active process");
            if cfg!(debug_assertions) {
                panic!("cancel() on session {} with no active process", handle.id);
            }
            return Err(SupervisorError::NotRunning);
        }

        tracing::info!(session_id = %handle.id, "cancel requested");
        // A full channel means a cancel is already pending.
        let _ = handle.cancel_tx.try_send(CancelReason::Operator);
        Ok(())
    }
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Ending {
    Exited(ExitOutcome),
    Cancel(CancelReason),
}

struct Driver {
    session: Box<dyn RunnerSession>,
    session_id: String,
    started: Instant,
    log: SessionLog,
    cancel_rx: mpsc::Receiver<CancelReason>,
    exit_tx: watch::Sender<Option<ExitOutcome>>,
    slot: Arc<Mutex<Slot>>,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    settings: SupervisorSettings,
}

async fn drive(mut d: Driver) {
    let (line_tx, line_rx) = mpsc::channel::<LineTap>(d.settings.line_channel_capacity);
    let mut pumps: Vec<JoinHandle<Result<u64, SupervisorError>>> = Vec::new();
    let max_line = d.settings.max_line_bytes;
    if let Some(out) = d.session.stdout() {
        pumps.push(io_pump::pump(out, LogStream::Stdout, line_tx.clone(), max_line));
    }
    if let Some(err) = d.session.stderr() {
        pumps.push(io_pump::pump(err, LogStream::Stderr, line_tx.clone(), max_line));
    }
    drop(line_tx);
    let sequencer = tokio::spawn(sequence(line_rx, d.log.clone()));

    let deadline = tokio::time::sleep(d.settings.run_timeout);
    tokio::pin!(deadline);

    let ending = tokio::select! {
        res = d.session.wait() => match res {
            Ok(outcome) => Ending::Exited(ExitOutcome::from_run(outcome)),
            Err(e) => {
                tracing::error!(session_id = %d.session_id, error = %e, "wait failed");
                Ending::Exited(ExitOutcome::Code(-1))
            }
        },
        Some(reason) = d.cancel_rx.recv() => Ending::Cancel(reason),
        _ = &mut deadline => {
            tracing::warn!(
                session_id = %d.session_id,
                timeout_secs = d.settings.run_timeout.as_secs(),
                "run timeout reached, cancelling"
            );
            Ending::Cancel(CancelReason::Timeout)
        }
    };

    let outcome = match ending {
        Ending::Exited(outcome) => outcome,
        Ending::Cancel(reason) => {
            let reaped = abort::terminate(
                &mut *d.session,
                d.settings.cancel_grace,
                d.settings.kill_wait,
            )
            .await;
            tracing::info!(session_id = %d.session_id, reaped = ?reaped, "child terminated after cancel");
            match reason {
                CancelReason::Operator => ExitOutcome::Cancelled,
                CancelReason::Timeout => ExitOutcome::TimedOut,
            }
        }
    };

    // Output still buffered in the pipes belongs to this session.
    let drain = futures::future::join_all(pumps.iter_mut());
    match tokio::time::timeout(d.settings.drain_timeout, drain).await {
        Ok(results) => {
            for r in results {
                match r {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(session_id = %d.session_id, error = %e, "output reader failed"),
                    Err(e) => tracing::warn!(session_id = %d.session_id, error = %e, "output reader panicked"),
                }
            }
        }
        Err(_) => {
            tracing::warn!(session_id = %d.session_id, "output still open after exit, detaching readers");
            for p in &pumps {
                p.abort();
            }
        }
    }
    if let Err(e) = sequencer.await {
        tracing::warn!(session_id = %d.session_id, error = %e, "sequencer task failed");
    }
    d.log.close();

    let summary = RunSummary {
        session_id: d.session_id.clone(),
        outcome,
        duration_ms: d.started.elapsed().as_millis() as u64,
        lines: d.log.next_seq(),
        dropped_lines: d.log.dropped(),
    };
    tracing::info!(
        session_id = %summary.session_id,
        outcome = %summary.outcome,
        duration_ms = summary.duration_ms,
        lines = summary.lines,
        dropped = summary.dropped_lines,
        "pipeline process finished"
    );

    {
        let mut slot = lock_slot(&d.slot);
        d.exit_tx.send_replace(Some(outcome));
        *slot = Slot::Idle;
    }
    let _ = d.events_tx.send(SupervisorEvent::Exited(summary));
}

/// Single writer of sequence numbers for one session.
async fn sequence(mut rx: mpsc::Receiver<LineTap>, log: SessionLog) {
    while let Some(tap) = rx.recv().await {
        match tap {
            LineTap::Line { stream, text, at } => {
                log.push(stream, text, at);
            }
            LineTap::Overflow { stream, dropped } => {
                log.record_dropped(dropped);
                log.push(
                    LogStream::Marker,
                    format!("[log buffer overflow: {dropped} {} lines dropped]", stream.as_str()),
                    Instant::now(),
                );
            }
        }
    }
}
