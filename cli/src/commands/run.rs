use std::io::Write;

use recon_core::api::{
    parse_request, AppConfig, CliError, ExitOutcome, LogLine, LogStream, OrchestrationController,
    Progress, RunSession,
};
use tokio::sync::mpsc;

use super::cli::RunArgs;

enum Wake {
    Progress(Progress),
    Interrupt,
}

/// Runs one stage in the foreground. The process exit code mirrors the stage's.
pub async fn run_cmd(args: RunArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let request = parse_request(
        &args.stage,
        &args.targets.join(","),
        args.headless(cfg.pipeline.headless_default),
    )?;

    let mut ctl = recon_plugins::factory::build_controller(cfg);
    ctl.start_up().await?;
    let session = ctl.request_run(request).await?;
    eprintln!(
        "session {}: stage `{}` (headless={})",
        session.id, session.request.stage, session.request.headless
    );

    let done = follow(&mut ctl).await;
    eprintln!("{}", ctl.status());
    Ok(done.as_ref().map(exit_code_for_session).unwrap_or(1))
}

async fn follow(ctl: &mut OrchestrationController) -> Option<RunSession> {
    let mut interrupts = spawn_interrupt_listener();
    let mut cancelled = false;
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();

    loop {
        let wake = tokio::select! {
            p = ctl.step() => Wake::Progress(p),
            Some(()) = interrupts.recv() => Wake::Interrupt,
        };
        match wake {
            Wake::Progress(progress) => {
                for line in &progress.lines {
                    print_line(line, &mut stdout.lock(), &mut stderr.lock());
                }
                if progress.finished.is_some() {
                    return progress.finished;
                }
                if !matches!(ctl.state(), recon_core::api::ControlState::Running) {
                    return None;
                }
            }
            Wake::Interrupt if !cancelled => {
                cancelled = true;
                eprintln!("interrupt received, stopping the stage (Ctrl-C again has no further effect)");
                if let Err(e) = ctl.cancel_run() {
                    tracing::warn!(error = %e, "cancel failed");
                }
            }
            Wake::Interrupt => {}
        }
    }
}

fn spawn_interrupt_listener() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_line(line: &LogLine, out: &mut impl Write, err: &mut impl Write) {
    let _ = match line.stream {
        LogStream::Stdout => writeln!(out, "{}", line.text),
        LogStream::Stderr => writeln!(err, "{}", line.text),
        LogStream::Marker => writeln!(err, "[recon-panel] {}", line.text),
    };
}

/// 0 on success, the literal code on failure, 128+N for a signal,
/// 130 when cancelled and 124 on timeout.
pub fn exit_code_for_session(session: &RunSession) -> i32 {
    match session.outcome {
        Some(ExitOutcome::Code(code)) => code,
        Some(ExitOutcome::Signal(sig)) => 128 + sig,
        Some(ExitOutcome::Cancelled) => 130,
        Some(ExitOutcome::TimedOut) => 124,
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recon_core::api::{RunRequest, RunSummary, Stage};

    fn ended(outcome: ExitOutcome) -> RunSession {
        let req = RunRequest {
            stage: Stage::Report,
            targets: vec![],
            headless: true,
        };
        RunSession::started("s1", req, Utc::now()).finished(RunSummary {
            session_id: "s1".into(),
            outcome,
            duration_ms: 10,
            lines: 0,
            dropped_lines: 0,
        })
    }

    #[test]
    fn exit_codes_follow_the_stage() {
        assert_eq!(exit_code_for_session(&ended(ExitOutcome::Code(0))), 0);
        assert_eq!(exit_code_for_session(&ended(ExitOutcome::Code(3))), 3);
        assert_eq!(exit_code_for_session(&ended(ExitOutcome::Signal(9))), 137);
        assert_eq!(exit_code_for_session(&ended(ExitOutcome::Cancelled)), 130);
        assert_eq!(exit_code_for_session(&ended(ExitOutcome::TimedOut)), 124);
    }

    #[test]
    fn markers_go_to_stderr() {
        let line = LogLine {
            session_id: "s1".into(),
            seq: 4,
            stream: LogStream::Marker,
            text: "[log buffer overflow: 3 stdout lines dropped]".into(),
            elapsed_ms: 1,
            at: Utc::now(),
        };
        let (mut out, mut err) = (Vec::new(), Vec::new());
        print_line(&line, &mut out, &mut err);
        assert!(out.is_empty());
        assert_eq!(
            String::from_utf8(err).unwrap(),
            "[recon-panel] [log buffer overflow: 3 stdout lines dropped]\n"
        );
    }
}
