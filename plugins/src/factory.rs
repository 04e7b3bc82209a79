use std::sync::Arc;

use recon_core::config::AppConfig;
use recon_core::controller::OrchestrationController;
use recon_core::runner::RunnerPlugin;

use crate::runner::process::ProcessRunnerPlugin;

pub fn build_runner(_cfg: &AppConfig) -> Arc<dyn RunnerPlugin> {
    Arc::new(ProcessRunnerPlugin::new())
}

/// A controller wired to the real process runner.
pub fn build_controller(cfg: &AppConfig) -> OrchestrationController {
    OrchestrationController::from_config(cfg, build_runner(cfg))
}
