//! Facade and scheduler tests against a stub ledger

use std::sync::Arc;
use std::time::Duration;

use notary::{DrainScheduler, NotaryConfig, NotaryService};
use notary_core_envelope::{Metadata, Span};
use notary_core_signer::{sign_span, Ed25519Signer};
use notary_outbox::{CredentialStore, OutboxStore, SqliteStore};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn span_json(id: &str) -> Vec<u8> {
    let span = Span::new(
        id,
        "activity",
        "observer",
        "focused",
        "device:test",
        "complete",
        Metadata::at("2025-10-31T18:00:00.000Z"),
        "private",
    );
    serde_json::to_vec(&span).unwrap()
}

fn ack() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"id": "ack", "digest": "b3:00"}))
}

async fn mount_enroll(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/enroll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_id": "d1",
            "tenant_id": "t1",
            "owner_id": "o1",
            "token": "tok"
        })))
        .mount(server)
        .await;
}

async fn service(server: &MockServer, store: Arc<SqliteStore>) -> NotaryService {
    let config = NotaryConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    NotaryService::with_parts(
        &config,
        Arc::new(Ed25519Signer::from_seed(&[3u8; 32])),
        store,
        "memory",
    )
    .await
    .unwrap()
}

async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().await.unwrap())
}

#[tokio::test]
async fn enqueue_requires_enrollment() {
    let server = MockServer::start().await;
    let store = store().await;
    let service = service(&server, store.clone()).await;

    let reply = service.enqueue_span(&span_json("s1")).await;
    assert!(!reply.ok);
    assert!(reply.error.unwrap().contains("not enrolled"));
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn enroll_then_enqueue_fills_metadata() {
    let server = MockServer::start().await;
    mount_enroll(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/spans"))
        .respond_with(ack())
        .expect(1)
        .mount(&server)
        .await;

    let store = store().await;
    let service = service(&server, store.clone()).await;

    assert!(service.enroll("fp-1").await.ok);
    let reply = service.enqueue_span(&span_json("s1")).await;
    assert!(reply.ok, "{:?}", reply.error);
    assert_eq!(store.pending_count().await.unwrap(), 0);

    let requests = server.received_requests().await.unwrap();
    let upload = requests
        .iter()
        .find(|r| r.url.path() == "/api/spans")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&upload.body).unwrap();
    assert_eq!(body["metadata"]["device_id"], "d1");
    assert_eq!(body["metadata"]["tenant_id"], "t1");
    assert_eq!(body["metadata"]["owner_id"], "o1");
    assert!(body["signature"]["sig"].is_string());
}

#[tokio::test]
async fn enqueue_keeps_caller_metadata() {
    let server = MockServer::start().await;
    mount_enroll(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/spans"))
        .respond_with(ack())
        .mount(&server)
        .await;

    let service = service(&server, store().await).await;
    service.enroll("fp").await;

    let mut span: serde_json::Value = serde_json::from_slice(&span_json("s1")).unwrap();
    span["metadata"]["tenant_id"] = json!("other-tenant");
    let reply = service
        .enqueue_span(&serde_json::to_vec(&span).unwrap())
        .await;
    assert!(reply.ok);

    let requests = server.received_requests().await.unwrap();
    let upload = requests
        .iter()
        .find(|r| r.url.path() == "/api/spans")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&upload.body).unwrap();
    assert_eq!(body["metadata"]["tenant_id"], "other-tenant");
    assert_eq!(body["metadata"]["device_id"], "d1");
}

#[tokio::test]
async fn enqueue_rejects_malformed_span() {
    let server = MockServer::start().await;
    mount_enroll(&server).await;
    let store = store().await;
    let service = service(&server, store.clone()).await;
    service.enroll("fp").await;

    let reply = service.enqueue_span(b"{\"id\":\"x\"}").await;
    assert!(!reply.ok);
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn health_reports_enrollment_and_backlog() {
    let server = MockServer::start().await;
    mount_enroll(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/spans"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let service = service(&server, store().await).await;
    let before = service.health().await;
    assert!(!before.enrolled);
    assert_eq!(before.device_id, "none");
    assert_eq!(before.status, "ok");
    assert_eq!(before.key_vault, "memory");

    service.enroll("fp").await;
    assert!(service.enqueue_span(&span_json("s1")).await.ok);
    assert!(service.enqueue_span(&span_json("s2")).await.ok);

    let after = service.health().await;
    assert!(after.enrolled);
    assert_eq!(after.device_id, "d1");
    assert_eq!(after.pending_count, 2);
    assert_eq!(service.outbox_status().await.unwrap(), 2);
}

#[tokio::test]
async fn drain_reports_false_when_not_enrolled() {
    let server = MockServer::start().await;
    let service = service(&server, store().await).await;
    assert!(!service.drain().await);
}

#[tokio::test]
async fn set_policy_validates_json() {
    let server = MockServer::start().await;
    let store = store().await;
    let service = service(&server, store.clone()).await;

    assert!(!service.set_policy(b"{not json").await);
    assert_eq!(store.get("current_policy").await.unwrap(), None);

    assert!(service.set_policy(br#"{"capture":["focus"]}"#).await);
    assert_eq!(
        store.get("current_policy").await.unwrap().as_deref(),
        Some(r#"{"capture":["focus"]}"#)
    );
    assert!(service.client().credentials().await.current_policy.is_some());
}

#[tokio::test]
async fn scheduler_drains_backlog_and_stops_on_cancel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/spans"))
        .respond_with(ack())
        .mount(&server)
        .await;

    let store = store().await;
    store.set("device_token", "tok").await.unwrap();

    let signer = Ed25519Signer::from_seed(&[3u8; 32]);
    for id in ["a", "b", "c"] {
        let mut span: Span = serde_json::from_slice(&span_json(id)).unwrap();
        sign_span(&mut span, &signer).unwrap();
        let json = String::from_utf8(span.to_canonical_json().unwrap()).unwrap();
        store
            .enqueue(id, span.digest.as_deref().unwrap(), &json)
            .await
            .unwrap();
    }

    let service = Arc::new(service(&server, store.clone()).await);
    let scheduler = DrainScheduler::new(service, Duration::from_millis(50));
    let token = scheduler.cancellation_token();
    let handle = scheduler.spawn();

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while store.pending_count().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "scheduler never emptied the outbox");

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}
