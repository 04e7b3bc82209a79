use std::path::PathBuf;

use thiserror::Error;

/// A full artifact re-scan could not be completed.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One artifact could not be opened or interpreted. Never aborts a listing.
#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("{path} does not exist")]
    Missing { path: PathBuf },

    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON (line {line}, column {column}): {message}")]
    InvalidJson {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{path} is {size} bytes, preview limit is {limit} bytes")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("{path} has an unrecognized extension")]
    Unclassified { path: PathBuf },
}
