#![cfg(unix)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use recon_core::api::{
    parse_request, AppConfig, ControlState, ExitOutcome, LogStream, OrchestrationController,
    ProcessSupervisor, RunState, RunnerStartArgs, SupervisorSettings, HEADLESS_ENV,
};
use recon_plugins::factory::build_controller;
use recon_plugins::runner::process::ProcessRunnerPlugin;

fn supervisor() -> ProcessSupervisor {
    let settings = SupervisorSettings {
        cancel_grace: Duration::from_millis(500),
        kill_wait: Duration::from_millis(500),
        drain_timeout: Duration::from_secs(3),
        ..SupervisorSettings::default()
    };
    ProcessSupervisor::new(Arc::new(ProcessRunnerPlugin::new()), settings).0
}

fn sh(script: &str) -> RunnerStartArgs {
    RunnerStartArgs {
        program: "/bin/sh".into(),
        args: vec!["-c".into(), script.into()],
        envs: HashMap::new(),
        cwd: None,
    }
}

#[tokio::test]
async fn lines_are_sequenced_without_gaps() {
    let sup = supervisor();
    let handle = sup
        .start(sh("i=0; while [ $i -lt 200 ]; do echo out $i; echo err $i >&2; i=$((i+1)); done"))
        .await
        .unwrap();

    assert_eq!(handle.await_exit().await, ExitOutcome::Code(0));
    let lines = handle.log().snapshot();
    assert_eq!(lines.len(), 400);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line.seq, i as u64);
        assert_eq!(line.session_id, handle.id());
    }
    let stdout: Vec<_> = lines
        .iter()
        .filter(|l| l.stream == LogStream::Stdout)
        .map(|l| l.text.clone())
        .collect();
    assert_eq!(stdout.first().map(String::as_str), Some("out 0"));
    assert_eq!(stdout.last().map(String::as_str), Some("out 199"));
}

#[tokio::test]
async fn nonzero_exit_code_is_reported_literally() {
    let sup = supervisor();
    let handle = sup.start(sh("echo boom >&2; exit 7")).await.unwrap();
    assert_eq!(handle.await_exit().await, ExitOutcome::Code(7));
    assert!(!sup.is_active());
}

#[tokio::test]
async fn environment_and_working_directory_reach_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor();
    let mut args = sh("echo $THREADSRECON_HEADLESS; pwd");
    args.envs.insert(HEADLESS_ENV.into(), "0".into());
    args.cwd = Some(dir.path().to_path_buf());

    let handle = sup.start(args).await.unwrap();
    handle.await_exit().await;
    let texts: Vec<String> = handle.log().snapshot().into_iter().map(|l| l.text).collect();
    assert_eq!(texts[0], "0");
    let reported = std::fs::canonicalize(&texts[1]).unwrap();
    assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
}

#[tokio::test]
async fn output_is_visible_while_the_child_runs() {
    let sup = supervisor();
    let handle = sup.start(sh("echo first; sleep 3; echo second")).await.unwrap();
    let mut sub = handle.stream();

    let first = tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("first line should arrive before the child exits")
        .unwrap();
    assert_eq!(first.text, "first");
    assert!(handle.exit_outcome().is_none());

    sup.cancel(&handle).unwrap();
    assert_eq!(handle.await_exit().await, ExitOutcome::Cancelled);
}

#[tokio::test]
async fn cancel_interrupts_the_whole_process_group() {
    let sup = supervisor();
    // The shell forks `sleep`, which shares its stdout; both must stop.
    let handle = sup.start(sh("echo go; sleep 30; echo never")).await.unwrap();
    let mut sub = handle.stream();
    assert_eq!(sub.next().await.unwrap().text, "go");

    let started = std::time::Instant::now();
    sup.cancel(&handle).unwrap();
    assert_eq!(handle.await_exit().await, ExitOutcome::Cancelled);
    // Well under the drain timeout: no grandchild kept the pipe open.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!sup.is_active());
    assert!(handle.log().snapshot().iter().all(|l| l.text != "never"));
}

#[tokio::test]
async fn ignored_interrupt_escalates_to_kill() {
    let sup = supervisor();
    let handle = sup
        .start(sh("trap '' INT; echo armed; while true; do sleep 1; done"))
        .await
        .unwrap();
    let mut sub = handle.stream();
    assert_eq!(sub.next().await.unwrap().text, "armed");

    sup.cancel(&handle).unwrap();
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(5), handle.await_exit())
            .await
            .unwrap(),
        ExitOutcome::Cancelled
    );
}

#[tokio::test]
async fn missing_program_is_a_launch_error() {
    let sup = supervisor();
    let mut args = sh("");
    args.program = "/nonexistent/python".into();
    let err = sup.start(args).await.unwrap_err();
    assert!(err.to_string().contains("/nonexistent/python"));
    assert!(!sup.is_active());
}

const PIPELINE: &str = r#"
stage="$1"
echo "stage=$stage headless=$THREADSRECON_HEADLESS"
mkdir -p data/visualizations
echo '{"profiles": []}' > data/analyzed_profiles.json
printf 'PNG' > data/visualizations/sentiment.png
[ "$stage" = "report" ] && { echo "renderer missing" >&2; exit 2; }
exit 0
"#;

fn pipeline_config(root: &std::path::Path) -> AppConfig {
    std::fs::write(root.join("pipeline.sh"), PIPELINE).unwrap();
    std::fs::write(
        root.join("settings.yaml"),
        "# scraper\nScraperSettings:\n  usernames:\n    - alice\n",
    )
    .unwrap();

    let mut cfg = AppConfig::default();
    cfg.pipeline.root = root.to_path_buf();
    cfg.pipeline.program = "/bin/sh".into();
    cfg.pipeline.prefix_args = vec!["pipeline.sh".into()];
    cfg.environment.browser_driver.name = "sh".into();
    cfg.environment.document_renderer.name = "sh".into();
    cfg
}

async fn ready(cfg: &AppConfig) -> OrchestrationController {
    let mut ctl = build_controller(cfg);
    ctl.start_up().await.unwrap();
    assert_eq!(ctl.state(), ControlState::Ready);
    assert!(ctl.run_enabled());
    ctl
}

#[tokio::test]
async fn controller_runs_a_stage_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = pipeline_config(dir.path());
    let mut ctl = ready(&cfg).await;

    let request = parse_request("analyze", "bob, carol", false).unwrap();
    ctl.request_run(request).await.unwrap();
    let mut lines = Vec::new();
    let done = ctl
        .run_until_settled(|l| lines.push(l.text.clone()))
        .await
        .unwrap();

    assert_eq!(done.state, RunState::Succeeded);
    assert_eq!(done.exit_code(), Some(0));
    assert_eq!(lines, vec!["stage=analyze headless=0"]);
    assert_eq!(ctl.state(), ControlState::Ready);
    assert_eq!(ctl.artifacts().len(), 2);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("settings.yaml")).unwrap(),
        "# scraper\nScraperSettings:\n  usernames:\n    - bob\n    - carol\n"
    );
}

#[tokio::test]
async fn controller_keeps_the_log_of_a_failed_stage() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = pipeline_config(dir.path());
    let mut ctl = ready(&cfg).await;

    ctl.request_run(parse_request("report", "", true).unwrap())
        .await
        .unwrap();
    let done = ctl.run_until_settled(|_| {}).await.unwrap();

    assert_eq!(done.state, RunState::Failed);
    assert_eq!(done.exit_code(), Some(2));
    let texts: Vec<&str> = ctl.history().iter().map(|l| l.text.as_str()).collect();
    assert!(texts.contains(&"stage=report headless=1"));
    assert!(texts.contains(&"renderer missing"));
    // Output written before the failure is still listed.
    assert_eq!(ctl.artifacts().len(), 2);
}
