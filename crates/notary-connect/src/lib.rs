//! Notary Connect: delivery client between the device outbox and the ledger
//!
//! Every span goes through the same path: it is signed, written to the
//! durable outbox, and only then uploaded. The outbox row is removed once
//! the ledger acknowledges it, so a crash or a network outage never loses a
//! span; it is simply uploaded on a later drain.
//!
//! # Architecture
//!
//! - **NotaryClient**: ingest, upload, drain, enrollment, manifests, events
//! - **TokenProvider**: bearer token slot filled in by enrollment
//! - **SseDecoder**: incremental `text/event-stream` parser
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use notary_connect::{ClientConfig, NotaryClient};
//! use notary_core_envelope::{Metadata, Span};
//! use notary_core_signer::Ed25519Signer;
//! use notary_outbox::SqliteStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("outbox.db").await?);
//!     let signer = Arc::new(Ed25519Signer::generate());
//!     let client = NotaryClient::new(ClientConfig::new("https://ledger.example.com"), signer, store).await?;
//!
//!     let span = Span::new(
//!         "", "activity", "observer", "focused", "device:a", "complete",
//!         Metadata::now(), "private",
//!     );
//!     let outcome = client.ingest(span).await?;
//!     println!("queued {} (confirmed: {})", outcome.id, outcome.confirmed);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod sse;
pub mod types;

pub use auth::TokenProvider;
pub use client::{idempotency_key, NotaryClient, IDEMPOTENCY_HEADER};
pub use error::{ClientError, Result};
pub use sse::{EventStream, SseDecoder};
pub use types::{
    ClientConfig, DrainOutcome, DrainReport, EnrollRequest, EnrollResponse, IngestOutcome,
    IngestResponse, UploadOutcome,
};
