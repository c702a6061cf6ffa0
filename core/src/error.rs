//! Error types for the fallible boundaries: store I/O and imports.
//!
//! Parse problems inside log data never surface here; the parser skips or
//! counts them per record.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("blob decode: {0}")]
    Blob(#[from] serde_json::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("i/o reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("import cancelled")]
    Cancelled,

    #[error("invalid path: {0}")]
    InvalidPath(PathBuf),
}

impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Store(StoreError::Sqlite(err))
    }
}
