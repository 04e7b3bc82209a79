use std::io::Write;
use std::path::{Path, PathBuf};

use super::document::{ConfigDocument, TargetPath};
use super::patch::{self, PatchOutcome};
use crate::config::AppConfig;
use crate::error::SettingsError;

/// Reads and parses `path`. A missing file is an empty document.
pub fn load(path: &Path) -> Result<ConfigDocument, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => ConfigDocument::parse(raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "settings file missing, starting empty");
            Ok(ConfigDocument::empty())
        }
        Err(source) => Err(SettingsError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes the document's raw text to `path` via a temp file in the same
/// directory and a rename, so readers see either the old or the new file.
pub fn save(doc: &ConfigDocument, path: &Path) -> Result<(), SettingsError> {
    write_atomic(path, doc.raw().as_bytes())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SettingsError> {
    let write_err = |source: std::io::Error| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".settings.")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    if let Ok(meta) = std::fs::metadata(path) {
        // Keep the operator's file mode; the temp file is created 0600.
        let _ = std::fs::set_permissions(tmp.path(), meta.permissions());
    }

    tmp.persist(path).map_err(|e| write_err(e.error))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "settings saved");
    Ok(())
}

/// The pipeline's `settings.yaml`, as seen by the panel.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    target_path: TargetPath,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, target_path: TargetPath) -> Self {
        Self {
            path: path.into(),
            target_path,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.settings_path(),
            TargetPath::new(cfg.pipeline.target_path.iter().cloned()),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target_path(&self) -> &TargetPath {
        &self.target_path
    }

    pub fn load(&self) -> Result<ConfigDocument, SettingsError> {
        load(&self.path)
    }

    pub fn save(&self, doc: &ConfigDocument) -> Result<(), SettingsError> {
        save(doc, &self.path)
    }

    pub fn patch_target_list(
        &self,
        doc: &ConfigDocument,
        names: &[String],
    ) -> Result<PatchOutcome, SettingsError> {
        patch::patch_target_list(doc, &self.target_path, names)
    }

    /// Load, patch and save in one step. Nothing is written when `names` is
    /// empty or the patch fails.
    pub fn apply_targets(&self, names: &[String]) -> Result<PatchOutcome, SettingsError> {
        let doc = self.load()?;
        let outcome = self.patch_target_list(&doc, names)?;
        if outcome.mode != patch::PatchMode::Unchanged {
            self.save(&outcome.document)?;
        }
        Ok(outcome)
    }

    /// Saves operator-edited text. Invalid YAML is rejected and nothing is written.
    pub fn save_text(&self, text: &str) -> Result<ConfigDocument, SettingsError> {
        let doc = ConfigDocument::parse(text)?;
        self.save(&doc)?;
        Ok(doc)
    }

    pub fn validate_text(text: &str) -> Result<(), SettingsError> {
        ConfigDocument::parse(text).map(|_| ())
    }
}
