use std::path::PathBuf;

use thiserror::Error;

/// Failures of the pipeline settings store (`settings.yaml`).
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The YAML text could not be parsed. Line and column are 1-based.
    #[error("{}", render_parse(.message, .line, .column))]
    Parse {
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },

    #[error("invalid target list: {0}")]
    Validation(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(String),
}

impl SettingsError {
    pub fn from_yaml(err: &serde_yaml::Error) -> Self {
        let location = err.location();
        Self::Parse {
            message: err.to_string(),
            line: location.as_ref().map(|l| l.line()),
            column: location.as_ref().map(|l| l.column()),
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

fn render_parse(message: &str, line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(l), Some(c)) if !message.contains("line") => {
            format!("invalid YAML at line {l}, column {c}: {message}")
        }
        _ => format!("invalid YAML: {message}"),
    }
}
