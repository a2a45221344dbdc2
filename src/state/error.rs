//! Error types for the checkpoint store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or saving the checkpoint.
#[derive(Error, Debug)]
pub enum StateError {
    /// Failed to open or create the checkpoint file.
    #[error("Failed to open checkpoint at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Failed to run a schema migration.
    #[error("Checkpoint migration failed: {0}")]
    Migration(#[from] rusqlite::Error),

    /// A query failed.
    #[error("Checkpoint query failed: {0}")]
    Query(String),

    /// The file exists but does not hold a valid transfer checkpoint.
    #[error("Malformed checkpoint at {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// The checkpoint schema version is newer than supported.
    #[error("Checkpoint schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },
}

impl StateError {
    /// Create a Query error from a rusqlite error.
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }
}
