//! The pipeline's own `settings.yaml`: load, surgical target-list patch, atomic save.

mod document;
mod patch;
mod store;

pub use document::{ConfigDocument, TargetPath};
pub use patch::{parse_targets_input, patch_target_list, validate_names, PatchMode, PatchOutcome};
pub use store::{load, save, ConfigStore};
