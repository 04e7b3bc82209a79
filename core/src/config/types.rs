use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub environment: EnvironmentConfig,

    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub tui: TuiConfig,
}

impl AppConfig {
    /// Resolves a pipeline-relative path against `pipeline.root`.
    pub fn pipeline_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        let rel = rel.as_ref();
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.pipeline.root.join(rel)
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.pipeline_path(&self.pipeline.settings_file)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.pipeline_path(&self.environment.output_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr. Ignored while the TUI owns the terminal.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "recon_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// How the external pipeline is launched and where its settings live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Working directory of the pipeline; relative paths below resolve against it.
    #[serde(default = "default_pipeline_root")]
    pub root: PathBuf,

    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the stage name, e.g. `["main.py"]`.
    #[serde(default = "default_prefix_args")]
    pub prefix_args: Vec<String>,

    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,

    /// Key path of the target list inside the settings document.
    #[serde(default = "default_target_path")]
    pub target_path: Vec<String>,

    /// Append targets as positional arguments after the stage name.
    #[serde(default)]
    pub pass_targets_as_args: bool,

    #[serde(default = "default_headless")]
    pub headless_default: bool,

    /// Extra environment for the child. `THREADSRECON_HEADLESS` is always
    /// set from the run request and cannot be overridden here.
    #[serde(default = "default_pipeline_env")]
    pub env: BTreeMap<String, String>,
}

fn default_pipeline_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_program() -> String {
    "python".to_string()
}

fn default_prefix_args() -> Vec<String> {
    vec!["main.py".to_string()]
}

fn default_settings_file() -> PathBuf {
    PathBuf::from("settings.yaml")
}

fn default_target_path() -> Vec<String> {
    vec!["ScraperSettings".to_string(), "usernames".to_string()]
}

fn default_headless() -> bool {
    true
}

fn default_pipeline_env() -> BTreeMap<String, String> {
    // Python block-buffers piped stdout; without this lines arrive at exit.
    BTreeMap::from([("PYTHONUNBUFFERED".to_string(), "1".to_string())])
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: default_pipeline_root(),
            program: default_program(),
            prefix_args: default_prefix_args(),
            settings_file: default_settings_file(),
            target_path: default_target_path(),
            pass_targets_as_args: false,
            headless_default: default_headless(),
            env: default_pipeline_env(),
        }
    }
}

/// An external binary the pipeline needs: looked up on PATH, then at `fallback`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinaryRequirement {
    pub name: String,
    #[serde(default)]
    pub fallback: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_browser_driver")]
    pub browser_driver: BinaryRequirement,

    #[serde(default = "default_document_renderer")]
    pub document_renderer: BinaryRequirement,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_version_probe_timeout_ms")]
    pub version_probe_timeout_ms: u64,
}

fn default_browser_driver() -> BinaryRequirement {
    BinaryRequirement {
        name: "chromedriver".to_string(),
        fallback: Some(PathBuf::from("/usr/local/bin/chromedriver")),
    }
}

fn default_document_renderer() -> BinaryRequirement {
    BinaryRequirement {
        name: "wkhtmltopdf".to_string(),
        fallback: Some(PathBuf::from("/usr/bin/wkhtmltopdf")),
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_version_probe_timeout_ms() -> u64 {
    5_000
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            browser_driver: default_browser_driver(),
            document_renderer: default_document_renderer(),
            output_dir: default_output_dir(),
            version_probe_timeout_ms: default_version_probe_timeout_ms(),
        }
    }
}

/// Locations scanned for pipeline output. Paths are relative to `pipeline.root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Flat (non-recursive) data export directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,

    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    /// Fixed files listed whenever present, wherever they live.
    #[serde(default = "default_structured_files")]
    pub structured_files: Vec<PathBuf>,

    #[serde(default = "default_document_files")]
    pub document_files: Vec<PathBuf>,

    #[serde(default = "default_preview_max_bytes")]
    pub preview_max_bytes: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("data/visualizations")
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("data/reports")
}

fn default_structured_files() -> Vec<PathBuf> {
    vec![
        PathBuf::from("data/profiles.json"),
        PathBuf::from("data/analyzed_profiles.json"),
    ]
}

fn default_document_files() -> Vec<PathBuf> {
    vec![PathBuf::from("data/reports/report.pdf")]
}

fn default_preview_max_bytes() -> u64 {
    32 * 1024 * 1024
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            images_dir: default_images_dir(),
            documents_dir: default_documents_dir(),
            structured_files: default_structured_files(),
            document_files: default_document_files(),
            preview_max_bytes: default_preview_max_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Capacity of the reader → sequencer channel. Lines beyond it are dropped with a marker.
    #[serde(default = "default_line_channel_capacity")]
    pub line_channel_capacity: usize,

    /// Longest line handed to the log. Output without a newline is split into
    /// pieces of at most this many bytes.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    /// Lines retained per session for late or restarted subscriptions.
    #[serde(default = "default_log_retention_lines")]
    pub log_retention_lines: usize,

    /// Lines of the current/last session kept by the controller for display.
    #[serde(default = "default_history_lines")]
    pub history_lines: usize,

    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,

    #[serde(default = "default_kill_wait_ms")]
    pub kill_wait_ms: u64,

    /// Hard ceiling on a single run; the child is cancelled when it is exceeded.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// How long to wait for the output readers after the child exits.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_line_channel_capacity() -> usize {
    1024
}

fn default_max_line_bytes() -> usize {
    64 * 1024
}

fn default_log_retention_lines() -> usize {
    20_000
}

fn default_history_lines() -> usize {
    50_000
}

fn default_cancel_grace_ms() -> u64 {
    5_000
}

fn default_kill_wait_ms() -> u64 {
    2_000
}

fn default_run_timeout_secs() -> u64 {
    4 * 60 * 60
}

fn default_drain_timeout_ms() -> u64 {
    2_000
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            line_channel_capacity: default_line_channel_capacity(),
            max_line_bytes: default_max_line_bytes(),
            log_retention_lines: default_log_retention_lines(),
            history_lines: default_history_lines(),
            cancel_grace_ms: default_cancel_grace_ms(),
            kill_wait_ms: default_kill_wait_ms(),
            run_timeout_secs: default_run_timeout_secs(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuiConfig {
    #[serde(default = "default_tui_enabled")]
    pub enabled: bool,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_tui_enabled() -> bool {
    true
}

fn default_tick_ms() -> u64 {
    100
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self {
            enabled: default_tui_enabled(),
            tick_ms: default_tick_ms(),
        }
    }
}
