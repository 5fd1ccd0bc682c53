//! Error types for the Wayfarer memory domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the read path never
//! produces any of them (it degrades to empty content instead).

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all Wayfarer operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Memory (write path) errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Startup configuration errors ---
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures surfaced by the write path.
///
/// Propagated exactly once to the caller and never retried here.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error at {path}: {reason}")]
    Storage { path: PathBuf, reason: String },

    #[error("Invalid entity key: {0}")]
    InvalidKey(String),

    #[error("Background write task failed: {0}")]
    TaskFailed(String),
}

impl MemoryError {
    pub fn storage(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// Fatal startup errors: the builder registry does not match the
/// configured set of memory-eligible agents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Unknown memory agent '{0}'")]
    UnknownAgent(String),

    #[error("Builder registry mismatch: missing builders for {missing:?}, unexpected builders for {unexpected:?}")]
    RegistryMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Notes-eligible agents {0:?} are not memory agents")]
    NotesNotSubset(Vec<String>),

    #[error("{0}")]
    Invalid(String),
}
