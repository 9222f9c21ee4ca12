//! Error types for the TaskPulse engine.
//!
//! This module defines the top-level error type returned by the
//! orchestrator, aggregating the per-module errors defined alongside the
//! components that produce them.

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Errors that can occur during engine operations.
///
/// This is the primary error type for the engine crate. The orchestrator
/// is the error boundary for interactive callers: version-control
/// failures never surface here (they degrade to empty results inside the
/// reader), while unknown identifiers and persistence save failures do.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Todo store error (unknown id, persistence failure).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether this error is an unknown-identifier error.
    ///
    /// Unknown ids are raised to the immediate caller and never retried;
    /// interactive frontends use this to print a targeted message.
    #[must_use]
    pub fn is_unknown_id(&self) -> bool {
        matches!(self, Self::Store(StoreError::UnknownTodo(_)))
    }
}

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
