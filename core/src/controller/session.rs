use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::runner::RunnerStartArgs;
use crate::state::RunRequest;

/// Environment variable carrying the headless flag to the pipeline.
pub const HEADLESS_ENV: &str = "THREADSRECON_HEADLESS";

/// How the controller turns a [`RunRequest`] into a process launch.
#[derive(Debug, Clone)]
pub struct InvocationOptions {
    pub program: String,
    pub prefix_args: Vec<String>,
    pub cwd: PathBuf,
    pub pass_targets_as_args: bool,
    pub env: BTreeMap<String, String>,
}

impl InvocationOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            program: cfg.pipeline.program.clone(),
            prefix_args: cfg.pipeline.prefix_args.clone(),
            cwd: cfg.pipeline.root.clone(),
            pass_targets_as_args: cfg.pipeline.pass_targets_as_args,
            env: cfg.pipeline.env.clone(),
        }
    }
}

/// `<program> [prefix args] <stage> [targets]`, headless flag in the environment.
pub fn build_invocation(opts: &InvocationOptions, request: &RunRequest) -> RunnerStartArgs {
    let mut args = opts.prefix_args.clone();
    args.push(request.stage.as_arg().to_string());
    if opts.pass_targets_as_args {
        args.extend(request.targets.iter().cloned());
    }

    let mut envs: HashMap<String, String> = opts
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    envs.insert(
        HEADLESS_ENV.to_string(),
        if request.headless { "1" } else { "0" }.to_string(),
    );

    RunnerStartArgs {
        program: opts.program.clone(),
        args,
        envs,
        cwd: Some(opts.cwd.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Stage;
    use pretty_assertions::assert_eq;

    fn opts() -> InvocationOptions {
        InvocationOptions::from_config(&AppConfig::default())
    }

    fn request(stage: Stage, headless: bool) -> RunRequest {
        RunRequest {
            stage,
            targets: vec!["alice".into(), "bob".into()],
            headless,
        }
    }

    #[test]
    fn stage_is_the_positional_argument() {
        let inv = build_invocation(&opts(), &request(Stage::Analyze, true));
        assert_eq!(inv.program, "python");
        assert_eq!(inv.args, vec!["main.py", "analyze"]);
        assert_eq!(inv.envs.get(HEADLESS_ENV).map(String::as_str), Some("1"));
        assert_eq!(inv.envs.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
    }

    #[test]
    fn headless_false_sets_zero() {
        let inv = build_invocation(&opts(), &request(Stage::Analyze, false));
        assert_eq!(inv.envs.get(HEADLESS_ENV).map(String::as_str), Some("0"));
    }

    #[test]
    fn configured_env_cannot_override_headless() {
        let mut o = opts();
        o.env.insert(HEADLESS_ENV.into(), "1".into());
        let inv = build_invocation(&o, &request(Stage::Report, false));
        assert_eq!(inv.envs.get(HEADLESS_ENV).map(String::as_str), Some("0"));
    }

    #[test]
    fn targets_are_appended_only_when_enabled() {
        let mut o = opts();
        o.pass_targets_as_args = true;
        let inv = build_invocation(&o, &request(Stage::Scrape, true));
        assert_eq!(inv.args, vec!["main.py", "scrape", "alice", "bob"]);
    }
}
