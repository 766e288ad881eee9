/*!
 * Notary - local signing and delivery daemon
 *
 * Takes span envelopes from a capture agent, signs them with the device's
 * Ed25519 key, keeps them in a durable SQLite outbox and delivers them to the
 * remote ledger with retry and backoff:
 * - Canonical JSON encoding with BLAKE3 digests (notary-core-envelope)
 * - Device key in the OS keyring or a sealed file (notary-core-signer)
 * - At-least-once outbox with dead letters (notary-outbox)
 * - Upload, drain, enrollment and timeline events (notary-connect)
 */

pub mod cli_style;
pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod service;

// Re-export commonly used types
pub use config::{LogLevel, NotaryConfig};
pub use error::{NotaryError, Result};
pub use scheduler::DrainScheduler;
pub use service::{Health, NotaryService, Reply};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
