use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::index::Category;
use crate::error::PreviewError;

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewMeta {
    pub path: PathBuf,
    pub category: Category,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub media_type: &'static str,
}

/// What a preview hands back. Images and documents are never decoded.
#[derive(Debug, Clone)]
pub enum Preview {
    Structured {
        value: serde_json::Value,
        meta: PreviewMeta,
    },
    Binary {
        bytes: Bytes,
        meta: PreviewMeta,
    },
}

impl Preview {
    pub fn meta(&self) -> &PreviewMeta {
        match self {
            Preview::Structured { meta, .. } | Preview::Binary { meta, .. } => meta,
        }
    }
}

fn media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

/// Reads one artifact. Failures are scoped to this file.
pub fn preview(path: &Path, max_bytes: u64) -> Result<Preview, PreviewError> {
    let category = Category::classify(path).ok_or_else(|| PreviewError::Unclassified {
        path: path.to_path_buf(),
    })?;

    let meta = std::fs::metadata(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => PreviewError::Missing {
            path: path.to_path_buf(),
        },
        _ => PreviewError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    if meta.len() > max_bytes {
        return Err(PreviewError::TooLarge {
            path: path.to_path_buf(),
            size: meta.len(),
            limit: max_bytes,
        });
    }

    let data = std::fs::read(path).map_err(|source| PreviewError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let info = PreviewMeta {
        path: path.to_path_buf(),
        category,
        size_bytes: data.len() as u64,
        modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
        media_type: media_type(path),
    };

    match category {
        Category::StructuredData => {
            let value = serde_json::from_slice(&data).map_err(|e| PreviewError::InvalidJson {
                path: path.to_path_buf(),
                line: e.line(),
                column: e.column(),
                message: e.to_string(),
            })?;
            Ok(Preview::Structured { value, meta: info })
        }
        Category::Image | Category::Document => Ok(Preview::Binary {
            bytes: Bytes::from(data),
            meta: info,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u64 = 1024 * 1024;

    #[test]
    fn corrupt_json_does_not_affect_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("profiles.json");
        let bad = dir.path().join("analyzed_profiles.json");
        std::fs::write(&good, r#"{"alice": {"followers": 10}}"#).unwrap();
        std::fs::write(&bad, "{\"alice\": [1, 2,\n").unwrap();

        let err = preview(&bad, LIMIT).unwrap_err();
        match err {
            PreviewError::InvalidJson { line, .. } => assert!(line >= 1),
            other => panic!("unexpected error: {other}"),
        }

        match preview(&good, LIMIT).unwrap() {
            Preview::Structured { value, meta } => {
                assert_eq!(value["alice"]["followers"], 10);
                assert_eq!(meta.media_type, "application/json");
            }
            other => panic!("unexpected preview: {other:?}"),
        }
    }

    #[test]
    fn images_are_returned_as_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("chart.png");
        // Not a real PNG; content is never inspected.
        std::fs::write(&png, b"not really a png").unwrap();
        match preview(&png, LIMIT).unwrap() {
            Preview::Binary { bytes, meta } => {
                assert_eq!(&bytes[..], b"not really a png");
                assert_eq!(meta.category, Category::Image);
                assert_eq!(meta.size_bytes, 16);
            }
            other => panic!("unexpected preview: {other:?}"),
        }
    }

    #[test]
    fn missing_and_oversized_files_are_preview_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.json");
        assert!(matches!(
            preview(&missing, LIMIT),
            Err(PreviewError::Missing { .. })
        ));

        let big = dir.path().join("report.pdf");
        std::fs::write(&big, vec![0u8; 64]).unwrap();
        assert!(matches!(
            preview(&big, 10),
            Err(PreviewError::TooLarge { size: 64, limit: 10, .. })
        ));
    }

    #[test]
    fn unknown_extension_is_unclassified() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "hi").unwrap();
        assert!(matches!(
            preview(&txt, LIMIT),
            Err(PreviewError::Unclassified { .. })
        ));
    }
}
