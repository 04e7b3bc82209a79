use super::{RunOutcome, RunnerPlugin, RunnerSession, RunnerStartArgs, Signal};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

/// Launches the pipeline as a local child process.
///
/// On unix the child leads its own process group, so signals reach the
/// browser driver and renderer it spawns as well.
pub struct ProcessRunnerPlugin {}

impl ProcessRunnerPlugin {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for ProcessRunnerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunnerPlugin for ProcessRunnerPlugin {
    fn name(&self) -> &str {
        "process"
    }

    async fn start_session(&self, args: &RunnerStartArgs) -> Result<Box<dyn RunnerSession>> {
        let mut cmd = Command::new(&args.program);
        cmd.args(&args.args)
            .envs(&args.envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &args.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .with_context(|| format!("spawn `{}`", args.program))?;
        tracing::debug!(program = %args.program, pid = ?child.id(), "child spawned");

        Ok(Box::new(ProcessRunnerSession { child }))
    }
}

struct ProcessRunnerSession {
    child: Child,
}

impl ProcessRunnerSession {
    #[cfg(unix)]
    fn signal_group(&mut self, signal: Signal) -> Result<()> {
        let Some(pid) = self.child.id() else {
            // Already reaped.
            return Ok(());
        };
        let sig = match signal {
            Signal::Interrupt => libc::SIGINT,
            Signal::Kill => libc::SIGKILL,
        };
        // Negative pid addresses the whole group led by the child.
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), sig) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        if signal == Signal::Kill {
            self.child.start_kill().context("kill child")?;
            return Ok(());
        }
        Err(err).context("signal process group")
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _signal: Signal) -> Result<()> {
        // No interrupt delivery for a detached child here; both escalate to kill.
        self.child.start_kill().context("kill child")?;
        Ok(())
    }
}

#[async_trait]
impl RunnerSession for ProcessRunnerSession {
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn signal(&mut self, signal: Signal) -> Result<()> {
        self.signal_group(signal)
    }

    async fn wait(&mut self) -> Result<RunOutcome> {
        let status = self.child.wait().await?;
        Ok(normalize_exit(status))
    }
}

fn normalize_exit(status: std::process::ExitStatus) -> RunOutcome {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        RunOutcome {
            exit_code: status.code(),
            signal: status.signal(),
        }
    }
    #[cfg(not(unix))]
    {
        RunOutcome {
            exit_code: status.code(),
            signal: None,
        }
    }
}
