//! Interactive panel: run controls, live log, environment and artifacts.

mod app;
mod events;
mod terminal;
mod ui;

use std::time::Duration;

use crossterm::event::KeyEvent;
use recon_core::api::{AppConfig, CliError, ControlState, OrchestrationController, Progress};

pub use app::{Action, PanelApp};
pub use terminal::check_tui_support;
use terminal::{restore_terminal, setup_terminal, PanelTerminal};

enum Wake {
    Key(KeyEvent),
    Progress(Progress),
    Tick,
}

pub async fn run_panel(cfg: &AppConfig) -> Result<i32, CliError> {
    let mut ctl = recon_plugins::factory::build_controller(cfg);
    let mut app = PanelApp::new(cfg.tui.clone(), cfg.pipeline.headless_default);
    let mut terminal = setup_terminal()?;
    let result = run_on_terminal(&mut terminal, &mut app, &mut ctl).await;
    restore_terminal(&mut terminal);
    result
}

async fn run_on_terminal(
    terminal: &mut PanelTerminal,
    app: &mut PanelApp,
    ctl: &mut OrchestrationController,
) -> Result<i32, CliError> {
    terminal.draw(|f| ui::draw(f, app, ctl))?;
    ctl.start_up().await?;

    let (input_reader, mut input_rx) = events::InputReader::start();
    let mut tick = tokio::time::interval(Duration::from_millis(app.config.tick_ms.max(16)));

    let result = loop {
        if let Err(e) = terminal.draw(|f| ui::draw(f, app, ctl)) {
            break Err(CliError::Io(e));
        }
        if app.quit_requested && ctl.state() != ControlState::Running {
            break Ok(0);
        }

        let running = ctl.state() == ControlState::Running;
        let wake = tokio::select! {
            Some(key) = input_rx.recv() => Wake::Key(key),
            p = ctl.step(), if running => Wake::Progress(p),
            _ = tick.tick() => Wake::Tick,
        };

        match wake {
            Wake::Key(key) => {
                let rows = app::artifact_rows(ctl.artifacts()).len();
                let action = app.handle_key(key, running, rows);
                perform(action, app, ctl).await;
            }
            Wake::Progress(progress) => {
                if let Some(done) = progress.finished {
                    tracing::debug!(session_id = %done.id, state = ?done.state, "run settled");
                }
            }
            Wake::Tick => {}
        }
    };

    input_reader.stop();
    result
}

async fn perform(action: Action, app: &mut PanelApp, ctl: &mut OrchestrationController) {
    // Failures are recorded by the controller and shown in the status line.
    match action {
        Action::None => {}
        Action::Quit => app.quit_requested = true,
        Action::Run => {
            if ctl.request_run(app.request()).await.is_ok() {
                app.on_run_started();
            }
        }
        Action::Cancel => {
            let _ = ctl.cancel_run();
        }
        Action::Revalidate => {
            let _ = ctl.revalidate().await;
        }
        Action::RefreshArtifacts => {
            let _ = ctl.refresh_artifacts();
        }
        Action::ProbeVersions => {
            if let Some(report) = ctl.report() {
                app.versions = Some(ctl.validator().probe_versions(report).await);
            }
        }
        Action::Preview(idx) => {
            let Some(entry) = app::artifact_rows(ctl.artifacts()).get(idx).map(|e| (*e).clone()) else {
                return;
            };
            app.preview = Some(app::PreviewView::build(&entry.display, ctl.preview(&entry.path)));
        }
    }
}
