//! Notary Core Signer
//!
//! Signs span digests with the device's Ed25519 key and verifies signed spans.
//!
//! The notary core only depends on the [`SpanSigner`] capability. Where the
//! key actually lives is a [`vault::KeyVault`] concern: the OS keyring, a
//! passphrase-sealed file, or plain memory in tests.
//!
//! # Example
//!
//! ```
//! use notary_core_envelope::{Metadata, Span};
//! use notary_core_signer::{sign_span, verify_span, Ed25519Signer};
//!
//! let signer = Ed25519Signer::generate();
//! let mut span = Span::new(
//!     "span-1", "activity", "observer", "focused", "device:a", "complete",
//!     Metadata::at("2025-10-31T18:00:00Z"), "private",
//! );
//! sign_span(&mut span, &signer).unwrap();
//! verify_span(&span).unwrap();
//! ```

pub mod ed25519;
pub mod envelope;
pub mod error;
pub mod vault;

pub use ed25519::Ed25519Signer;
pub use envelope::{sign_span, verify_span};
pub use error::{Result, SignerError};
pub use vault::{open_vault, KeyVault, MemoryVault, VaultKind, VaultOptions, VaultSigner};

/// Algorithm name carried in span signature blocks
pub const ALGORITHM_ED25519: &str = "ed25519";

/// Capability to sign 32-byte span digests
pub trait SpanSigner: Send + Sync {
    /// Raw 32-byte public key
    fn public_key(&self) -> Result<[u8; 32]>;

    /// Sign the raw digest bytes
    fn sign(&self, digest: &[u8; 32]) -> Result<[u8; 64]>;

    /// Algorithm name stamped into the signature block
    fn algorithm(&self) -> &'static str {
        ALGORITHM_ED25519
    }
}

impl<T: SpanSigner + ?Sized> SpanSigner for std::sync::Arc<T> {
    fn public_key(&self) -> Result<[u8; 32]> {
        (**self).public_key()
    }

    fn sign(&self, digest: &[u8; 32]) -> Result<[u8; 64]> {
        (**self).sign(digest)
    }

    fn algorithm(&self) -> &'static str {
        (**self).algorithm()
    }
}
