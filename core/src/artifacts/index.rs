use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{AppConfig, ArtifactsConfig};
use crate::error::ArtifactError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    StructuredData,
    Image,
    Document,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::StructuredData, Category::Image, Category::Document];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::StructuredData => "structured-data",
            Category::Image => "image",
            Category::Document => "document",
        }
    }

    /// Extension-only classification; file contents are never sniffed.
    pub fn classify(path: &Path) -> Option<Category> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Category::StructuredData),
            "png" | "jpg" | "jpeg" | "svg" | "gif" | "webp" => Some(Category::Image),
            "pdf" | "html" | "htm" => Some(Category::Document),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactEntry {
    /// Absolute location, suitable for opening outside the panel.
    pub path: PathBuf,
    /// Location relative to the pipeline root, for display.
    pub display: String,
    pub category: Category,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactIndex {
    pub base_dir: PathBuf,
    pub scanned_at: DateTime<Utc>,
    pub entries: BTreeMap<Category, Vec<ArtifactEntry>>,
}

impl ArtifactIndex {
    pub fn empty(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            scanned_at: Utc::now(),
            entries: Category::ALL.iter().map(|c| (*c, Vec::new())).collect(),
        }
    }

    pub fn category(&self, category: Category) -> &[ArtifactEntry] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when the pipeline has produced nothing yet.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn find(&self, path: &Path) -> Option<&ArtifactEntry> {
        self.entries.values().flatten().find(|e| e.path == path)
    }
}

/// The three scanned locations plus the fixed files, resolved against a base directory.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub base_dir: PathBuf,
    pub data_dir: PathBuf,
    pub images_dir: PathBuf,
    pub documents_dir: PathBuf,
    pub fixed_files: Vec<PathBuf>,
}

impl ArtifactLayout {
    pub fn new(base_dir: impl Into<PathBuf>, cfg: &ArtifactsConfig) -> Self {
        let base_dir = absolutize(&base_dir.into());
        let join = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base_dir.join(p)
            }
        };
        Self {
            data_dir: join(&cfg.data_dir),
            images_dir: join(&cfg.images_dir),
            documents_dir: join(&cfg.documents_dir),
            fixed_files: cfg
                .structured_files
                .iter()
                .chain(cfg.document_files.iter())
                .map(|p| join(p))
                .collect(),
            base_dir,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(&cfg.pipeline.root, &cfg.artifacts)
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Full re-scan. Missing locations are empty; an unreadable one fails the whole scan.
pub fn scan(layout: &ArtifactLayout) -> Result<ArtifactIndex, ArtifactError> {
    let mut found: BTreeMap<PathBuf, Category> = BTreeMap::new();

    for path in list_dir(&layout.data_dir, false)? {
        if let Some(c) = Category::classify(&path) {
            found.insert(path, c);
        }
    }
    for path in list_dir(&layout.images_dir, true)? {
        match Category::classify(&path) {
            Some(c) => {
                found.insert(path, c);
            }
            None => tracing::debug!(path = %path.display(), "skipping unclassified file"),
        }
    }
    for path in list_dir(&layout.documents_dir, false)? {
        if Category::classify(&path) == Some(Category::Document) {
            found.insert(path, Category::Document);
        }
    }
    for path in &layout.fixed_files {
        if path.is_file() {
            if let Some(c) = Category::classify(path) {
                found.insert(path.clone(), c);
            }
        }
    }

    let mut index = ArtifactIndex::empty(&layout.base_dir);
    for (path, category) in found {
        let meta = match std::fs::metadata(&path) {
            Ok(m) => m,
            // Removed between listing and stat.
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(source) => return Err(ArtifactError::Scan { path, source }),
        };
        let display = path
            .strip_prefix(&layout.base_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();
        let entry = ArtifactEntry {
            display,
            category,
            size_bytes: meta.len(),
            modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
            path,
        };
        index.entries.entry(category).or_default().push(entry);
    }

    tracing::debug!(base = %layout.base_dir.display(), files = index.len(), "artifact scan complete");
    Ok(index)
}

fn list_dir(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, ArtifactError> {
    let rd = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ArtifactError::Scan {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut out = Vec::new();
    for entry in rd {
        let entry = entry.map_err(|source| ArtifactError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(_) => continue,
        };
        if file_type.is_dir() {
            if recursive {
                out.extend(list_dir(&path, true)?);
            }
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(out)
}
