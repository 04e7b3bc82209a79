//! In-memory runner for tests: output and exit are driven by the test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, DuplexStream};
use tokio::sync::oneshot;

use super::traits::{RunnerPlugin, RunnerSession};
use super::types::{RunOutcome, RunnerStartArgs, Signal};

pub(crate) struct ScriptedSession {
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    exit_rx: Option<oneshot::Receiver<i32>>,
    signals: Arc<Mutex<Vec<Signal>>>,
    exit_on_interrupt: bool,
    done: Option<RunOutcome>,
}

#[async_trait]
impl RunnerSession for ScriptedSession {
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    async fn signal(&mut self, signal: Signal) -> anyhow::Result<()> {
        self.signals.lock().unwrap().push(signal);
        if self.exit_on_interrupt || signal == Signal::Kill {
            self.done = Some(RunOutcome {
                exit_code: None,
                signal: Some(if signal == Signal::Kill { 9 } else { 2 }),
            });
        }
        Ok(())
    }

    async fn wait(&mut self) -> anyhow::Result<RunOutcome> {
        if let Some(done) = self.done {
            return Ok(done);
        }
        let code = match self.exit_rx.as_mut() {
            Some(rx) => rx.await.unwrap_or(-1),
            None => std::future::pending().await,
        };
        self.exit_rx = None;
        let outcome = RunOutcome {
            exit_code: Some(code),
            signal: None,
        };
        self.done = Some(outcome);
        Ok(outcome)
    }
}

/// The test's end of one scripted child.
pub(crate) struct Harness {
    pub stdout: DuplexStream,
    pub stderr: DuplexStream,
    pub exit_tx: oneshot::Sender<i32>,
    pub signals: Arc<Mutex<Vec<Signal>>>,
}

impl Harness {
    /// Closes both streams and exits with `code`.
    pub fn exit(self, code: i32) {
        drop(self.stdout);
        drop(self.stderr);
        let _ = self.exit_tx.send(code);
    }
}

pub(crate) struct ScriptedPlugin {
    sessions: Mutex<Vec<ScriptedSession>>,
    pub starts: AtomicUsize,
    pub launched: Mutex<Vec<RunnerStartArgs>>,
}

impl ScriptedPlugin {
    /// `n` children handed out in order; further starts fail to launch.
    pub fn with_sessions(n: usize, exit_on_interrupt: bool) -> (Arc<Self>, Vec<Harness>) {
        let mut sessions = Vec::new();
        let mut harnesses = Vec::new();
        for _ in 0..n {
            let (out_w, out_r) = tokio::io::duplex(64 * 1024);
            let (err_w, err_r) = tokio::io::duplex(64 * 1024);
            let (exit_tx, exit_rx) = oneshot::channel();
            let signals = Arc::new(Mutex::new(Vec::new()));
            sessions.push(ScriptedSession {
                stdout: Some(out_r),
                stderr: Some(err_r),
                exit_rx: Some(exit_rx),
                signals: signals.clone(),
                exit_on_interrupt,
                done: None,
            });
            harnesses.push(Harness {
                stdout: out_w,
                stderr: err_w,
                exit_tx,
                signals,
            });
        }
        sessions.reverse();
        (
            Arc::new(Self {
                sessions: Mutex::new(sessions),
                starts: AtomicUsize::new(0),
                launched: Mutex::new(Vec::new()),
            }),
            harnesses,
        )
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunnerPlugin for ScriptedPlugin {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start_session(&self, args: &RunnerStartArgs) -> anyhow::Result<Box<dyn RunnerSession>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.launched.lock().unwrap().push(args.clone());
        match self.sessions.lock().unwrap().pop() {
            Some(s) => Ok(Box::new(s)),
            None => Err(anyhow::anyhow!("no such file or directory")),
        }
    }
}
