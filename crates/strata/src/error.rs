//! Error types for Strata

use thiserror::Error;

use crate::backend::BackendError;
use crate::hooks::{HookError, HookPoint};
use crate::memory::session::SessionIdError;

/// Main error type for Strata operations
#[derive(Error, Debug)]
pub enum StrataError {
    /// Vector index errors (LanceDB, in-memory index, etc.)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Embedding generation errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The selected backend model failed; surfaces to the caller as a failed turn
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// A plugin hook aborted the turn
    #[error("Hook {point} failed in plugin '{plugin}': {source}")]
    Hook {
        plugin: String,
        point: HookPoint,
        #[source]
        source: HookError,
    },

    /// Static cache errors (missing or expired records)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Rejected session identifier
    #[error("Invalid session id: {0}")]
    Session(#[from] SessionIdError),

    /// `chat` was called before `initialize`
    #[error("Engine not initialized, call initialize() first")]
    NotInitialized,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;
