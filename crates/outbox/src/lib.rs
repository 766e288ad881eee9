//! Notary Outbox: durable at-least-once delivery queue for signed spans
//!
//! # Overview
//!
//! Every signed span is written here before any network attempt, so nothing
//! is lost if the device is offline, the server is down or the process
//! crashes mid-upload. Entries leave the outbox only when the server confirms
//! receipt or when they are quarantined into the dead-letter table.
//!
//! # Features
//!
//! - **Idempotent enqueue**: the digest is unique; re-enqueueing the same
//!   span reports [`QueueError::AlreadyExists`]
//! - **Backoff scheduling**: failed deliveries are pushed out by
//!   [`BackoffPolicy`]; nothing is dropped for failing transiently
//! - **Dead letters**: undecodable rows can be moved aside with a reason
//! - **Credentials**: a small key-value table for enrollment results
//!
//! # Example
//!
//! ```no_run
//! use notary_outbox::{BackoffPolicy, OutboxStore, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), notary_outbox::QueueError> {
//!     let store = SqliteStore::open("outbox.db").await?;
//!     store.enqueue("span-1", "b3:...", "{}").await?;
//!
//!     while let Some(entry) = store.next_ready().await? {
//!         // try to deliver...
//!         store.mark_failed(&entry.id, &BackoffPolicy::default()).await?;
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod backends;
pub mod backoff;
pub mod clock;
pub mod credentials;
pub mod error;

#[cfg(feature = "sqlite")]
pub use backends::sqlite::SqliteStore;

pub use backoff::BackoffPolicy;
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::Credentials;
pub use error::{QueueError, Result};

/// A signed span waiting for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Insertion order, used to break ties between equally-due entries
    pub seq: i64,
    pub id: String,
    pub digest: String,
    /// Canonical JSON of the signed span
    pub serialized_span: String,
    /// Failed delivery attempts so far
    pub tries: u32,
    /// Earliest time the next attempt may happen
    pub next_attempt_at: DateTime<Utc>,
}

/// An entry removed from the retry loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: String,
    pub digest: String,
    pub serialized_span: String,
    pub tries: u32,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

/// Core trait for the durable outbox
///
/// Implementations own their rows exclusively. Every method is a single
/// short storage operation; callers never hold a transaction across network
/// I/O.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Queue a signed span with `tries = 0`, due immediately
    ///
    /// Fails with [`QueueError::AlreadyExists`] if the digest is already
    /// queued and [`QueueError::IdConflict`] if the id is queued under a
    /// different digest.
    async fn enqueue(&self, id: &str, digest: &str, serialized_span: &str) -> Result<()>;

    /// The due entry with the earliest `next_attempt_at`, ties by insertion order
    async fn next_ready(&self) -> Result<Option<OutboxEntry>>;

    /// Look up an entry by id regardless of when it is due
    async fn find(&self, id: &str) -> Result<Option<OutboxEntry>>;

    /// Look up an entry by digest regardless of when it is due
    async fn find_by_digest(&self, digest: &str) -> Result<Option<OutboxEntry>>;

    /// Remove a delivered entry; deleting a missing id is not an error
    async fn mark_delivered(&self, id: &str) -> Result<()>;

    /// Record a failed attempt and push the entry out by the backoff delay
    ///
    /// Returns the new `next_attempt_at`.
    async fn mark_failed(&self, id: &str, policy: &BackoffPolicy) -> Result<DateTime<Utc>>;

    /// Number of entries still queued, due or not
    async fn pending_count(&self) -> Result<usize>;

    /// Move an entry to the dead-letter table
    async fn quarantine(&self, id: &str, reason: &str) -> Result<()>;

    /// Number of dead-lettered entries
    async fn dead_letter_count(&self) -> Result<usize>;

    /// All dead-lettered entries, oldest first
    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;
}

/// Persistent string key-value storage for device credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write several keys at once; either all of them land or none do
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}
