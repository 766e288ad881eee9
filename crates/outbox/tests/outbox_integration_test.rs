//! End-to-end outbox behaviour with a controllable clock

use chrono::Duration;
use notary_outbox::{
    BackoffPolicy, Clock, CredentialStore, Credentials, ManualClock, OutboxStore, SqliteStore,
};
use std::sync::Arc;
use tempfile::TempDir;

async fn open_with_clock(dir: &TempDir) -> (SqliteStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let store = SqliteStore::open(dir.path().join("outbox.db"))
        .await
        .unwrap()
        .with_clock(clock.clone());
    (store, clock)
}

#[tokio::test]
async fn enqueue_ready_deliver_scenario() {
    let dir = TempDir::new().unwrap();
    let (store, _clock) = open_with_clock(&dir).await;

    store.enqueue("A", "b3:dA", "{\"id\":\"A\"}").await.unwrap();

    let entry = store.next_ready().await.unwrap().expect("entry due immediately");
    assert_eq!(entry.id, "A");
    assert_eq!(entry.digest, "b3:dA");
    assert_eq!(entry.tries, 0);

    store.mark_delivered("A").await.unwrap();
    assert_eq!(store.pending_count().await.unwrap(), 0);
    assert!(store.next_ready().await.unwrap().is_none());
}

#[tokio::test]
async fn failed_entry_waits_out_its_backoff() {
    let dir = TempDir::new().unwrap();
    let (store, clock) = open_with_clock(&dir).await;
    let policy = BackoffPolicy::default();

    store.enqueue("A", "b3:dA", "{}").await.unwrap();
    let start = clock.now();

    let next = store.mark_failed("A", &policy).await.unwrap();
    let delay = next - start;
    assert!(delay >= Duration::seconds(60));
    assert!(delay < Duration::seconds(78));

    // Not due yet
    clock.advance(Duration::seconds(59));
    assert!(store.next_ready().await.unwrap().is_none());
    assert_eq!(store.pending_count().await.unwrap(), 1);

    // Due once the jittered delay has passed
    clock.advance(Duration::seconds(20));
    let entry = store.next_ready().await.unwrap().expect("entry due again");
    assert_eq!(entry.tries, 1);
}

#[tokio::test]
async fn repeated_failures_grow_then_cap() {
    let dir = TempDir::new().unwrap();
    let (store, clock) = open_with_clock(&dir).await;
    let policy = BackoffPolicy::default();
    store.enqueue("A", "b3:dA", "{}").await.unwrap();

    let ceiling = Duration::from_std(policy.ceiling()).unwrap();
    let mut previous_nominal = Duration::zero();
    for tries in 0..10u32 {
        let now = clock.now();
        let next = store.mark_failed("A", &policy).await.unwrap();
        let delay = next - now;

        let nominal = Duration::from_std(policy.nominal_delay(tries)).unwrap();
        assert!(nominal >= previous_nominal);
        assert!(delay >= nominal);
        assert!(delay <= ceiling);
        previous_nominal = nominal;

        clock.set(next);
    }

    let entry = store.find("A").await.unwrap().unwrap();
    assert_eq!(entry.tries, 10);
}

#[tokio::test]
async fn earliest_due_entry_comes_first() {
    let dir = TempDir::new().unwrap();
    let (store, clock) = open_with_clock(&dir).await;
    let policy = BackoffPolicy::default().without_jitter();

    store.enqueue("slow", "b3:01", "{}").await.unwrap();
    store.enqueue("fast", "b3:02", "{}").await.unwrap();

    // Push "slow" out; "fast" stays due
    store.mark_failed("slow", &policy).await.unwrap();
    assert_eq!(store.next_ready().await.unwrap().unwrap().id, "fast");

    clock.advance(Duration::seconds(61));
    store.mark_delivered("fast").await.unwrap();
    assert_eq!(store.next_ready().await.unwrap().unwrap().id, "slow");
}

#[tokio::test]
async fn queue_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let (store, _clock) = open_with_clock(&dir).await;
        store.enqueue("A", "b3:dA", "{}").await.unwrap();
        store.enqueue("B", "b3:dB", "{}").await.unwrap();
        store.pool().close().await;
    }

    let (store, _clock) = open_with_clock(&dir).await;
    assert_eq!(store.pending_count().await.unwrap(), 2);
    assert!(store.enqueue("A", "b3:dA", "{}").await.unwrap_err().is_already_exists());
}

#[tokio::test]
async fn credentials_round_trip() {
    let dir = TempDir::new().unwrap();
    let (store, _clock) = open_with_clock(&dir).await;

    let loaded = Credentials::load(&store).await.unwrap();
    assert!(!loaded.is_enrolled());

    let creds = Credentials {
        device_token: Some("tok".into()),
        device_id: Some("dev-1".into()),
        tenant_id: Some("tenant-1".into()),
        owner_id: Some("owner-1".into()),
        current_policy: None,
    };
    creds.save(&store).await.unwrap();

    let loaded = Credentials::load(&store).await.unwrap();
    assert_eq!(loaded, creds);
    assert!(loaded.is_enrolled());
    assert_eq!(store.get("device_id").await.unwrap().as_deref(), Some("dev-1"));
}
