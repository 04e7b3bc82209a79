use clap::Parser;
use recon_cli::app;
use recon_cli::commands::cli;
use recon_core::api::{CliError, ErrorKind, LoggingConfig, SettingsError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", describe_error(&e));
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = app::load_config(&args)?;
    // The panel owns the screen; console logs would tear it.
    init_tracing(&cfg.logging, !app::wants_tui(&args)).map_err(CliError::Config)?;
    app::dispatch(args, cfg).await
}

fn describe_error(e: &CliError) -> String {
    match e {
        CliError::Controller(ce) => ce.user_message(),
        other => other.to_string(),
    }
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 11: panel config error
    // 12: settings parse / validation error
    // 20: launch / IO error
    // 30: environment checks failed
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Settings(se) => settings_exit_code(se),
        CliError::Controller(ce) => match ce.kind() {
            ErrorKind::Parse | ErrorKind::Validation => 12,
            ErrorKind::Read | ErrorKind::Write | ErrorKind::ProcessLaunch | ErrorKind::Preview => 20,
            ErrorKind::EnvironmentCheckFailure => 30,
            ErrorKind::ConcurrentRun | ErrorKind::InvalidState | ErrorKind::Internal => 50,
        },
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
    }
}

fn settings_exit_code(e: &SettingsError) -> i32 {
    match e {
        SettingsError::Parse { .. } | SettingsError::Validation(_) => 12,
        SettingsError::Read { .. } | SettingsError::Write { .. } | SettingsError::Serialize(_) => 20,
    }
}

fn init_tracing(logging: &LoggingConfig, console_allowed: bool) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("recon-panel"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("recon-panel.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    let console = logging.console && console_allowed;
    if !console && maybe_writer.is_none() {
        // Nothing to write to (e.g. the panel is up and file logging is off).
        return Ok(());
    }

    let console_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
