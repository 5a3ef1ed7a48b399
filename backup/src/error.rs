//! Error types for the engine.
//!
//! Only failures that end the run live here. Per-entry filesystem problems
//! go through [`crate::events::ErrorKind`] reporting instead and never
//! unwind.

use std::path::PathBuf;

use crate::entry::Side;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A root path argument failed validation.
    #[error("invalid {} path {:?}: {}", .side, .path, .reason)]
    InvalidPath {
        side: Side,
        path: PathBuf,
        reason: String,
    },

    /// IO errors outside the per-entry reporting flow.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker thread panicked; the first captured panic is re-raised
    /// through this variant after all pools have been joined.
    #[error("worker thread panicked: {0}")]
    WorkerPanic(String),
}

impl EngineError {
    pub fn invalid_path(side: Side, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            side,
            path: path.into(),
            reason: reason.into(),
        }
    }
}
