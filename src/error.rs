//! Error taxonomy for engine operations.
//!
//! Only root-level failures are fatal to a request. File-local failures
//! degrade to warnings on the result (see [`crate::types::IndexWarning`]).

use std::path::Path;
use thiserror::Error;

/// Fatal errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Root path missing or not a directory. Aborts the whole request.
    #[error("scan failed: {0}")]
    Scan(String),

    /// Requested root or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid line range on a read. Fatal to that single call only.
    #[error("invalid line range: {0}")]
    Range(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(path: &Path) -> Self {
        Self::NotFound(path.display().to_string())
    }
}

/// Result alias used across the engine's public surface.
pub type Result<T> = std::result::Result<T, EngineError>;
