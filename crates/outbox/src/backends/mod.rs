//! Backend implementations for OutboxStore
//!
//! - `sqlite`: SQLite-based backend (default, requires `sqlite` feature)

#[cfg(feature = "sqlite")]
pub mod sqlite;
