//! Core types and error definitions for the Mnemos memory engine.
//!
//! This crate provides the foundational types shared across all Mnemos crates.
//!
//! # Main types
//!
//! - [`MnemosError`] — Unified error enum for all engine subsystems.
//! - [`MnemosResult`] — Convenience alias for `Result<T, MnemosError>`.
//! - [`EntryId`] — Identifier shared by the entry arena and both indexes.

/// Identifier of a memory entry.
///
/// Assigned once on creation and shared by the keyword index, the vector
/// index, and the trigger matcher.
pub type EntryId = u64;

// --- Error types ---

/// Top-level error type for the Mnemos engine.
///
/// Each variant corresponds to one class of failure the engine can report.
#[derive(Debug, thiserror::Error)]
pub enum MnemosError {
    /// A malformed entry or request, rejected before anything is written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The embedding provider failed or timed out.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The keyword and vector indexes disagree on an entry's existence.
    #[error("Index inconsistency: {0}")]
    IndexInconsistency(String),

    /// No checkpoint exists under the requested name.
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// A checkpoint restore could not complete. Live state is unchanged.
    #[error("Restore failed: {reason}")]
    RestoreFailed {
        /// Human-readable cause.
        reason: String,
        /// Whether retrying the same restore may succeed.
        retryable: bool,
    },

    /// A bounded operation gave up before finishing. Nothing was changed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// No entry exists with the given id.
    #[error("Entry not found: {0}")]
    NotFound(EntryId),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the snapshot storage backend.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MnemosError {
    /// Returns `true` when the same operation may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            MnemosError::RestoreFailed { retryable, .. } => *retryable,
            MnemosError::EmbeddingUnavailable(_) | MnemosError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Builds a [`MnemosError::RestoreFailed`] that should not be retried as-is.
    pub fn restore_failed(reason: impl Into<String>) -> Self {
        MnemosError::RestoreFailed {
            reason: reason.into(),
            retryable: false,
        }
    }
}

/// A convenience `Result` alias using [`MnemosError`].
pub type MnemosResult<T> = Result<T, MnemosError>;
