#[allow(clippy::module_inception)]
pub mod error;
pub mod artifact;
pub mod controller;
pub mod settings;

pub use artifact::{ArtifactError, PreviewError};
pub use controller::{ControllerError, ErrorKind};
pub use error::{CliError, SupervisorError};
pub use settings::SettingsError;
