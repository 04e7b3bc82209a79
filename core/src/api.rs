//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `recon_core::api` instead of reaching into internal modules.

pub use crate::artifacts::{
    ArtifactEntry, ArtifactIndex, ArtifactLayout, ArtifactRepository, Category, Preview,
    PreviewMeta,
};
pub use crate::config::{
    get_panel_data_dir, load_default, AppConfig, ArtifactsConfig, BinaryRequirement,
    ControlConfig, EnvironmentConfig, LoggingConfig, PipelineConfig, TuiConfig,
};
pub use crate::controller::{
    build_invocation, parse_request, InvocationOptions, OrchestrationController, Progress,
    HEADLESS_ENV,
};
pub use crate::env_check::{
    CheckResult, EnvironmentReport, EnvironmentValidator, Resolution, VersionInfo,
};
pub use crate::error::{
    ArtifactError, CliError, ControllerError, ErrorKind, PreviewError, SettingsError,
    SupervisorError,
};
pub use crate::runner::{
    CancelReason, ExitOutcome, LogLine, LogPoll, LogStream, LogSubscription, ProcessSupervisor,
    RunOutcome, RunSummary, RunnerPlugin, RunnerSession, RunnerStartArgs, SessionHandle, Signal,
    SupervisorEvent, SupervisorSettings,
};
pub use crate::settings::{parse_targets_input, ConfigDocument, ConfigStore, PatchMode, TargetPath};
pub use crate::state::{ControlState, ControllerEvent, RunRequest, RunSession, RunState, Stage};
