//! SQLite backend implementation
//!
//! Provides persistent storage using SQLite with WAL mode for concurrency.
//! Timestamps are stored as epoch milliseconds so the due-entry scan is a
//! plain integer range over an index.

use crate::clock::{Clock, SystemClock};
use crate::error::{QueueError, Result};
use crate::{BackoffPolicy, CredentialStore, DeadLetter, OutboxEntry, OutboxStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// SQLite-backed outbox and credential store
pub struct SqliteStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the specified path
    ///
    /// Automatically runs migrations to set up the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    QueueError::Corrupt(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        // Configure connection with WAL mode for better concurrency
        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::with_pool(pool).await?;
        info!(path = %path.display(), "Opened outbox database");
        Ok(store)
    }

    /// Fresh in-memory database, gone when the store is dropped
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // Every connection to :memory: is a separate database, so pin exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get the underlying pool (for advanced usage)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| QueueError::Corrupt(format!("timestamp out of range: {}", millis)))
}

// Helper to convert SqliteRow to OutboxEntry
fn row_to_entry(row: &SqliteRow) -> Result<OutboxEntry> {
    let tries: i64 = row.try_get("tries")?;
    Ok(OutboxEntry {
        seq: row.try_get("seq")?,
        id: row.try_get("id")?,
        digest: row.try_get("digest")?,
        serialized_span: row.try_get("serialized_span")?,
        tries: u32::try_from(tries)
            .map_err(|_| QueueError::Corrupt(format!("negative tries: {}", tries)))?,
        next_attempt_at: millis_to_datetime(row.try_get("next_attempt_at")?)?,
    })
}

fn row_to_dead_letter(row: &SqliteRow) -> Result<DeadLetter> {
    let tries: i64 = row.try_get("tries")?;
    Ok(DeadLetter {
        id: row.try_get("id")?,
        digest: row.try_get("digest")?,
        serialized_span: row.try_get("serialized_span")?,
        tries: u32::try_from(tries).unwrap_or(0),
        reason: row.try_get("reason")?,
        quarantined_at: millis_to_datetime(row.try_get("quarantined_at")?)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

const ENTRY_COLUMNS: &str = "seq, id, digest, serialized_span, tries, next_attempt_at";

#[async_trait]
impl OutboxStore for SqliteStore {
    async fn enqueue(&self, id: &str, digest: &str, serialized_span: &str) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO outbox (id, digest, serialized_span, tries, next_attempt_at)
             VALUES (?, ?, ?, 0, ?)",
        )
        .bind(id)
        .bind(digest)
        .bind(serialized_span)
        .bind(self.now_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(span_id = %id, digest = %digest, "Queued span");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                // Work out which constraint fired
                let same_digest = sqlx::query("SELECT 1 FROM outbox WHERE digest = ?")
                    .bind(digest)
                    .fetch_optional(&self.pool)
                    .await?
                    .is_some();

                if same_digest {
                    Err(QueueError::AlreadyExists {
                        digest: digest.to_string(),
                    })
                } else {
                    Err(QueueError::IdConflict { id: id.to_string() })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn next_ready(&self) -> Result<Option<OutboxEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM outbox
             WHERE next_attempt_at <= ?
             ORDER BY next_attempt_at ASC, seq ASC
             LIMIT 1",
            ENTRY_COLUMNS
        ))
        .bind(self.now_millis())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn find(&self, id: &str) -> Result<Option<OutboxEntry>> {
        let row = sqlx::query(&format!("SELECT {} FROM outbox WHERE id = ?", ENTRY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn find_by_digest(&self, digest: &str) -> Result<Option<OutboxEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM outbox WHERE digest = ?",
            ENTRY_COLUMNS
        ))
        .bind(digest)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn mark_delivered(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM outbox WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(span_id = %id, "Delivered span was already removed");
        } else {
            debug!(span_id = %id, "Removed delivered span");
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &str, policy: &BackoffPolicy) -> Result<DateTime<Utc>> {
        let mut tx = self.pool.begin().await?;

        let tries_before: i64 = sqlx::query("SELECT tries FROM outbox WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| QueueError::not_found(id))?
            .try_get("tries")?;

        let tries_before = u32::try_from(tries_before).unwrap_or(u32::MAX);
        let delay = chrono::Duration::from_std(policy.delay_for(tries_before))
            .unwrap_or_else(|_| chrono::Duration::seconds(policy.max.as_secs() as i64));
        let next_attempt_at = self.clock.now() + delay;

        sqlx::query("UPDATE outbox SET tries = tries + 1, next_attempt_at = ? WHERE id = ?")
            .bind(next_attempt_at.timestamp_millis())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            span_id = %id,
            tries = tries_before.saturating_add(1),
            next_attempt_at = %next_attempt_at,
            "Scheduled retry"
        );
        Ok(next_attempt_at)
    }

    async fn pending_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM outbox")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(count as usize)
    }

    async fn quarantine(&self, id: &str, reason: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            "INSERT INTO dead_letter (id, digest, serialized_span, tries, reason, quarantined_at)
             SELECT id, digest, serialized_span, tries, ?, ? FROM outbox WHERE id = ?
             ON CONFLICT (id) DO UPDATE SET
                 digest = excluded.digest,
                 serialized_span = excluded.serialized_span,
                 tries = excluded.tries,
                 reason = excluded.reason,
                 quarantined_at = excluded.quarantined_at",
        )
        .bind(reason)
        .bind(self.now_millis())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            return Err(QueueError::not_found(id));
        }

        sqlx::query("DELETE FROM outbox WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        warn!(span_id = %id, reason = %reason, "Quarantined span");
        Ok(())
    }

    async fn dead_letter_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM dead_letter")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(count as usize)
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            "SELECT id, digest, serialized_span, tries, reason, quarantined_at
             FROM dead_letter ORDER BY quarantined_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_dead_letter).collect()
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(r.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in entries {
            sqlx::query(
                "INSERT INTO kv (key, value) VALUES (?, ?)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            )
            .bind(*key)
            .bind(*value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn store_with_clock() -> (SqliteStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = SqliteStore::in_memory()
            .await
            .unwrap()
            .with_clock(clock.clone());
        (store, clock)
    }

    #[tokio::test]
    async fn test_sqlite_basic_flow() -> Result<()> {
        let (store, _clock) = store_with_clock().await;

        store.enqueue("a", "b3:aa", "{\"id\":\"a\"}").await?;
        assert_eq!(store.pending_count().await?, 1);

        let entry = store.next_ready().await?.unwrap();
        assert_eq!(entry.id, "a");
        assert_eq!(entry.tries, 0);

        store.mark_delivered("a").await?;
        assert_eq!(store.pending_count().await?, 0);
        assert!(store.next_ready().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_digest_rejected() -> Result<()> {
        let (store, _clock) = store_with_clock().await;
        store.enqueue("a", "b3:aa", "{}").await?;

        let err = store.enqueue("a", "b3:aa", "{}").await.unwrap_err();
        assert!(err.is_already_exists());

        let err = store.enqueue("other", "b3:aa", "{}").await.unwrap_err();
        assert!(err.is_already_exists());

        assert_eq!(store.pending_count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_id_conflict() -> Result<()> {
        let (store, _clock) = store_with_clock().await;
        store.enqueue("a", "b3:aa", "{}").await?;

        let err = store.enqueue("a", "b3:bb", "{}").await.unwrap_err();
        assert!(matches!(err, QueueError::IdConflict { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_ties_break_by_insertion_order() -> Result<()> {
        let (store, _clock) = store_with_clock().await;
        store.enqueue("first", "b3:01", "{}").await?;
        store.enqueue("second", "b3:02", "{}").await?;

        assert_eq!(store.next_ready().await?.unwrap().id, "first");
        store.mark_delivered("first").await?;
        assert_eq!(store.next_ready().await?.unwrap().id, "second");
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_failed_missing_is_not_found() {
        let (store, _clock) = store_with_clock().await;
        let err = store
            .mark_failed("ghost", &BackoffPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_mark_delivered_is_idempotent() -> Result<()> {
        let (store, _clock) = store_with_clock().await;
        store.mark_delivered("never-existed").await?;
        store.enqueue("a", "b3:aa", "{}").await?;
        store.mark_delivered("a").await?;
        store.mark_delivered("a").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_quarantine_moves_row() -> Result<()> {
        let (store, clock) = store_with_clock().await;
        store.enqueue("bad", "b3:bad", "not json").await?;
        store.mark_failed("bad", &BackoffPolicy::default()).await?;
        clock.advance(Duration::minutes(5));

        store.quarantine("bad", "undecodable span").await?;
        assert_eq!(store.pending_count().await?, 0);
        assert_eq!(store.dead_letter_count().await?, 1);

        let dead = store.dead_letters().await?;
        assert_eq!(dead[0].id, "bad");
        assert_eq!(dead[0].tries, 1);
        assert_eq!(dead[0].reason, "undecodable span");

        assert!(matches!(
            store.quarantine("bad", "again").await,
            Err(QueueError::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_kv_round_trip() -> Result<()> {
        let (store, _clock) = store_with_clock().await;
        assert_eq!(store.get("device_token").await?, None);

        store.set("device_token", "t1").await?;
        store.set("device_token", "t2").await?;
        assert_eq!(store.get("device_token").await?.as_deref(), Some("t2"));

        store.remove("device_token").await?;
        assert_eq!(store.get("device_token").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_by_digest() -> Result<()> {
        let (store, _clock) = store_with_clock().await;
        store.enqueue("a", "b3:aa", "{}").await?;

        assert_eq!(store.find_by_digest("b3:aa").await?.unwrap().id, "a");
        assert!(store.find_by_digest("b3:zz").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_set_many_writes_every_key() -> Result<()> {
        let (store, _clock) = store_with_clock().await;
        store.set("tenant_id", "old").await?;

        store
            .set_many(&[("device_token", "tok"), ("tenant_id", "t1")])
            .await?;
        assert_eq!(store.get("device_token").await?.as_deref(), Some("tok"));
        assert_eq!(store.get("tenant_id").await?.as_deref(), Some("t1"));

        store.set_many(&[]).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_set_many_rolls_back_on_failure() -> Result<()> {
        let (store, _clock) = store_with_clock().await;
        sqlx::query(
            "CREATE TRIGGER reject_owner BEFORE INSERT ON kv
             WHEN NEW.key = 'owner_id'
             BEGIN SELECT RAISE(ABORT, 'owner rejected'); END",
        )
        .execute(store.pool())
        .await?;

        let result = store
            .set_many(&[("device_token", "tok"), ("owner_id", "o1")])
            .await;
        assert!(result.is_err());
        assert_eq!(store.get("device_token").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("outbox.db");

        {
            let store = SqliteStore::open(&path).await?;
            store.enqueue("persisted", "b3:pp", "{}").await?;
            store.set("tenant_id", "t").await?;
            store.pool().close().await;
        }

        let store = SqliteStore::open(&path).await?;
        assert_eq!(store.pending_count().await?, 1);
        assert_eq!(store.find("persisted").await?.unwrap().digest, "b3:pp");
        assert_eq!(store.get("tenant_id").await?.as_deref(), Some("t"));
        Ok(())
    }
}
