//! Error types for the outbox

use thiserror::Error;

/// Result type for outbox operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised by outbox and credential storage
#[derive(Debug, Error)]
pub enum QueueError {
    /// An entry with this digest is already queued
    ///
    /// Callers treat this as success: the span is already on its way.
    #[error("Span with digest {digest} is already queued")]
    AlreadyExists { digest: String },

    /// The id is queued under a different digest
    #[error("Span id {id} is already queued with a different digest")]
    IdConflict { id: String },

    /// No entry with this id
    #[error("No queued span with id {id}")]
    NotFound { id: String },

    /// A stored row could not be interpreted
    #[error("Corrupt outbox row: {0}")]
    Corrupt(String),

    /// Underlying database failure
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure
    #[cfg(feature = "sqlite")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl QueueError {
    /// True for the duplicate-enqueue case, which callers treat as success
    pub fn is_already_exists(&self) -> bool {
        matches!(self, QueueError::AlreadyExists { .. })
    }

    pub fn not_found<S: Into<String>>(id: S) -> Self {
        QueueError::NotFound { id: id.into() }
    }
}
