mod load;
mod types;

pub use load::{get_panel_data_dir, load_default};
pub use types::{
    AppConfig, ArtifactsConfig, BinaryRequirement, ControlConfig, EnvironmentConfig,
    LoggingConfig, PipelineConfig, TuiConfig,
};
