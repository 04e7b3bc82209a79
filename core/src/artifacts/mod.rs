//! Listing and previewing files the pipeline leaves under its output directory.

mod index;
mod preview;

use std::path::Path;

pub use index::{scan, ArtifactEntry, ArtifactIndex, ArtifactLayout, Category};
pub use preview::{preview, Preview, PreviewMeta};

use crate::config::AppConfig;
use crate::error::{ArtifactError, PreviewError};

/// Holds the last good index. A failed refresh leaves it untouched.
#[derive(Debug, Clone)]
pub struct ArtifactRepository {
    layout: ArtifactLayout,
    preview_max_bytes: u64,
    index: ArtifactIndex,
}

impl ArtifactRepository {
    pub fn new(layout: ArtifactLayout, preview_max_bytes: u64) -> Self {
        let index = ArtifactIndex::empty(&layout.base_dir);
        Self {
            layout,
            preview_max_bytes,
            index,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            ArtifactLayout::from_config(cfg),
            cfg.artifacts.preview_max_bytes,
        )
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn index(&self) -> &ArtifactIndex {
        &self.index
    }

    pub fn refresh(&mut self) -> Result<&ArtifactIndex, ArtifactError> {
        match scan(&self.layout) {
            Ok(index) => {
                tracing::info!(files = index.len(), "artifact index refreshed");
                self.index = index;
                Ok(&self.index)
            }
            Err(e) => {
                tracing::warn!(error = %e, "artifact refresh failed, keeping previous index");
                Err(e)
            }
        }
    }

    pub fn preview(&self, path: &Path) -> Result<Preview, PreviewError> {
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.layout.base_dir.join(path)
        };
        preview(&resolved, self.preview_max_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArtifactsConfig;

    #[test]
    fn refresh_replaces_index_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = ArtifactRepository::new(
            ArtifactLayout::new(dir.path(), &ArtifactsConfig::default()),
            1024,
        );
        assert!(repo.refresh().unwrap().is_empty());

        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/profiles.json"), "[]").unwrap();
        assert_eq!(repo.refresh().unwrap().len(), 1);

        std::fs::remove_file(dir.path().join("data/profiles.json")).unwrap();
        assert!(repo.refresh().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn failed_refresh_keeps_previous_index() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("data/visualizations");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("a.png"), b"x").unwrap();

        let mut repo = ArtifactRepository::new(
            ArtifactLayout::new(dir.path(), &ArtifactsConfig::default()),
            1024,
        );
        repo.refresh().unwrap();
        let before = repo.index().clone();

        std::fs::set_permissions(&images, std::fs::Permissions::from_mode(0o000)).unwrap();
        let unreadable = std::fs::read_dir(&images).is_err();
        if unreadable {
            assert!(repo.refresh().is_err());
            assert_eq!(repo.index(), &before);
        }
        std::fs::set_permissions(&images, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn preview_resolves_relative_paths_against_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/profiles.json"), r#"{"ok":true}"#).unwrap();
        let repo = ArtifactRepository::new(
            ArtifactLayout::new(dir.path(), &ArtifactsConfig::default()),
            1024,
        );
        let p = repo.preview(Path::new("data/profiles.json")).unwrap();
        assert!(matches!(p, Preview::Structured { .. }));
    }
}
