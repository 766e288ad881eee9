//! Error types for the notary-connect crate

use notary_core_envelope::EnvelopeError;
use notary_core_signer::SignerError;
use notary_outbox::QueueError;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Encoding failed: {0}")]
    Encoding(#[from] EnvelopeError),

    #[error("Signing failed: {0}")]
    Signing(#[from] SignerError),

    #[error("Outbox error: {0}")]
    Queue(#[from] QueueError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server rejected request with status {status}: {message}")]
    ServerRejected { status: u16, message: String },

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Device is not enrolled")]
    NotEnrolled,

    #[error("Event stream ended: {0}")]
    StreamClosed(String),
}

impl ClientError {
    /// Failures that a later retry may get past
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::StreamClosed(_) => true,
            ClientError::ServerRejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
