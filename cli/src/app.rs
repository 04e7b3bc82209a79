//! CLI wiring: load the panel config, apply flag overrides, dispatch the subcommand.
use recon_core::api::{self as core_api, AppConfig, CliError};

use crate::commands::artifacts::{artifacts_cmd, preview_cmd};
use crate::commands::check::check_cmd;
use crate::commands::cli::{Args, Commands};
use crate::commands::run::run_cmd;
use crate::commands::settings::settings_cmd;

pub fn load_config(args: &Args) -> Result<AppConfig, CliError> {
    let mut cfg = core_api::load_default(args.config.as_deref())
        .map_err(|e| CliError::Config(format!("{e:#}")))?;
    if let Some(root) = &args.root {
        cfg.pipeline.root = root.clone();
    }
    Ok(cfg)
}

/// Whether the interactive panel will own the terminal for this invocation.
pub fn wants_tui(args: &Args) -> bool {
    matches!(args.command, None | Some(Commands::Tui))
}

#[tracing::instrument(name = "cli.dispatch", skip_all)]
pub async fn dispatch(args: Args, cfg: AppConfig) -> Result<i32, CliError> {
    tracing::debug!(
        root = %cfg.pipeline.root.display(),
        program = %cfg.pipeline.program,
        "panel config loaded"
    );
    match args.command {
        Some(Commands::Check(a)) => check_cmd(a, &cfg).await,
        Some(Commands::Run(a)) => run_cmd(a, &cfg).await,
        Some(Commands::Artifacts(a)) => artifacts_cmd(a, &cfg),
        Some(Commands::Preview(a)) => preview_cmd(a, &cfg),
        Some(Commands::Settings(c)) => settings_cmd(c, &cfg),
        Some(Commands::Tui) | None => {
            if !cfg.tui.enabled {
                return Err(CliError::Command(
                    "the interactive panel is disabled ([tui].enabled = false); use a subcommand"
                        .to_string(),
                ));
            }
            crate::tui::check_tui_support().map_err(CliError::Command)?;
            crate::tui::run_panel(&cfg).await
        }
    }
}
