use std::time::Duration;

use super::traits::RunnerSession;
use super::types::{RunOutcome, Signal};

/// Interrupt, wait up to `grace`, then kill and wait up to `kill_wait`.
///
/// Returns `None` when the child still has not been reaped after the kill.
pub async fn terminate(
    session: &mut dyn RunnerSession,
    grace: Duration,
    kill_wait: Duration,
) -> Option<RunOutcome> {
    if let Err(e) = session.signal(Signal::Interrupt).await {
        tracing::warn!(error = %e, "interrupt failed, escalating to kill");
    } else {
        match tokio::time::timeout(grace, session.wait()).await {
            Ok(Ok(outcome)) => return Some(outcome),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "wait after interrupt failed");
            }
            Err(_) => {
                tracing::warn!(grace_ms = grace.as_millis() as u64, "child ignored interrupt, killing");
            }
        }
    }

    if let Err(e) = session.signal(Signal::Kill).await {
        tracing::error!(error = %e, "kill failed");
    }
    match tokio::time::timeout(kill_wait, session.wait()).await {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "wait after kill failed");
            None
        }
        Err(_) => {
            tracing::error!(kill_wait_ms = kill_wait.as_millis() as u64, "child not reaped after kill");
            None
        }
    }
}
