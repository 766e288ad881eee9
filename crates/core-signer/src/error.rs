//! Error types for signing and key storage

use notary_core_envelope::EnvelopeError;
use thiserror::Error;

/// Result type for signer operations
pub type Result<T> = std::result::Result<T, SignerError>;

/// Errors raised while signing, verifying or loading keys
#[derive(Error, Debug)]
pub enum SignerError {
    /// Span could not be canonicalized
    #[error("Encoding error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The underlying key could not produce a signature
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Key bytes are malformed
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Span carries no digest/signature
    #[error("Span {id} is not signed")]
    Unsigned { id: String },

    /// Recomputed digest does not match the stamped one
    #[error("Digest mismatch: expected {expected}, computed {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Signature does not verify against the embedded public key
    #[error("Signature verification failed for span {id}")]
    BadSignature { id: String },

    /// Signature block names an algorithm we cannot verify
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// OS keyring access failed
    #[error("Keyring error: {0}")]
    Keyring(String),

    /// Sealed key file could not be opened (wrong passphrase or tampered file)
    #[error("Failed to unseal key file {path}")]
    Unseal { path: String },

    /// Key derivation or encryption failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The selected vault needs a passphrase that was not provided
    #[error("Key vault passphrase not provided (set NOTARY_KEY_PASSPHRASE)")]
    MissingPassphrase,

    /// The selected vault is not compiled into this build
    #[error("Key vault '{0}' is not available in this build")]
    VaultUnavailable(String),

    /// I/O error on the key file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key file is not valid JSON
    #[error("Key file format error: {0}")]
    Format(#[from] serde_json::Error),
}
