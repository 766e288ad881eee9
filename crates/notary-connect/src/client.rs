//! HTTP client for the ledger: sign, queue, upload, drain

use std::sync::Arc;

use bytes::Bytes;
use notary_core_envelope::Span;
use notary_core_signer::{sign_span, SpanSigner};
use notary_outbox::{CredentialStore, Credentials, OutboxEntry, OutboxStore, QueueError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::auth::TokenProvider;
use crate::error::{ClientError, Result};
use crate::sse::{event_stream, EventStream};
use crate::types::{
    ClientConfig, DrainOutcome, DrainReport, EnrollRequest, EnrollResponse, IngestOutcome,
    IngestResponse, UploadOutcome,
};

/// User agent for ledger requests.
const USER_AGENT_VALUE: &str = concat!("notary/", env!("CARGO_PKG_VERSION"));

/// Header carrying the per-tenant dedup key
pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

/// Idempotency key for a span: hex of `"{tenant}-{digest}"`
pub fn idempotency_key(tenant_id: &str, digest: &str) -> String {
    hex::encode(format!("{}-{}", tenant_id, digest))
}

/// Delivery client
///
/// Owns the path from a freshly produced span to a ledger acknowledgement:
/// every span is signed and written to the outbox before any network
/// attempt, and only removed once the ledger confirms it.
pub struct NotaryClient {
    http: reqwest::Client,
    /// Same settings minus the whole-request timeout, for long-lived streams
    stream_http: reqwest::Client,
    base_url: String,
    config: ClientConfig,
    signer: Arc<dyn SpanSigner>,
    outbox: Arc<dyn OutboxStore>,
    credential_store: Arc<dyn CredentialStore>,
    credentials: RwLock<Credentials>,
    token_provider: TokenProvider,
    drain_gate: Mutex<()>,
}

impl NotaryClient {
    /// Create a client over a store that holds both the outbox and credentials
    ///
    /// Stored credentials are loaded once here; the bearer token comes from
    /// them and is replaced in place when [`enroll`](Self::enroll) succeeds.
    pub async fn new<S>(
        config: ClientConfig,
        signer: Arc<dyn SpanSigner>,
        store: Arc<S>,
    ) -> Result<Self>
    where
        S: OutboxStore + CredentialStore + 'static,
    {
        let credentials = Credentials::load(store.as_ref()).await?;
        let token_provider = TokenProvider::shared(credentials.device_token.clone());
        Self::build(config, signer, store.clone(), store, credentials, token_provider)
    }

    /// Create a client with a custom token provider
    pub async fn with_token_provider<S>(
        config: ClientConfig,
        signer: Arc<dyn SpanSigner>,
        store: Arc<S>,
        token_provider: TokenProvider,
    ) -> Result<Self>
    where
        S: OutboxStore + CredentialStore + 'static,
    {
        let credentials = Credentials::load(store.as_ref()).await?;
        Self::build(config, signer, store.clone(), store, credentials, token_provider)
    }

    fn build(
        config: ClientConfig,
        signer: Arc<dyn SpanSigner>,
        outbox: Arc<dyn OutboxStore>,
        credential_store: Arc<dyn CredentialStore>,
        credentials: Credentials,
        token_provider: TokenProvider,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .default_headers(default_headers.clone())
            .build()?;

        let stream_http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(default_headers)
            .build()?;

        // Normalize base URL (remove trailing slash)
        let base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            http,
            stream_http,
            base_url,
            config,
            signer,
            outbox,
            credential_store,
            credentials: RwLock::new(credentials),
            token_provider,
            drain_gate: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn outbox(&self) -> &Arc<dyn OutboxStore> {
        &self.outbox
    }

    pub fn credential_store(&self) -> &Arc<dyn CredentialStore> {
        &self.credential_store
    }

    /// Snapshot of the cached credentials
    pub async fn credentials(&self) -> Credentials {
        self.credentials.read().await.clone()
    }

    pub async fn is_enrolled(&self) -> bool {
        self.token_provider.get_token().await.is_some()
    }

    /// Hex-encoded public key of the signing identity
    pub fn public_key_hex(&self) -> Result<String> {
        Ok(hex::encode(self.signer.public_key()?))
    }

    pub fn signer_algorithm(&self) -> &'static str {
        self.signer.algorithm()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn bearer(&self) -> Result<String> {
        self.token_provider
            .get_token()
            .await
            .ok_or(ClientError::NotEnrolled)
    }

    /// Sign a span, persist it, then try to deliver it once
    ///
    /// The span is durable once this returns `Ok`. A span that is already
    /// queued is not queued twice, but its existing entry still gets the
    /// immediate attempt. A failed delivery attempt is not an error here:
    /// the entry stays queued with backoff and `confirmed` is false.
    pub async fn ingest(&self, mut span: Span) -> Result<IngestOutcome> {
        span.ensure_id();
        sign_span(&mut span, self.signer.as_ref())?;

        let digest = span
            .digest
            .clone()
            .ok_or_else(|| ClientError::InvalidResponse("signer left span without digest".into()))?;
        let serialized = String::from_utf8(span.to_canonical_json()?)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        match self.outbox.enqueue(&span.id, &digest, &serialized).await {
            Ok(()) => {}
            Err(QueueError::AlreadyExists { .. }) => {
                debug!(span_id = %span.id, digest = %digest, "Span already queued");
            }
            Err(e) => return Err(e.into()),
        }

        let mut outcome = IngestOutcome {
            id: span.id.clone(),
            digest,
            confirmed: false,
        };

        // Leave the entry to the running drain rather than racing it
        let Ok(_gate) = self.drain_gate.try_lock() else {
            debug!(span_id = %span.id, "Drain in progress, deferring upload");
            return Ok(outcome);
        };

        // A resubmitted span is uploaded from its existing row, due or not
        let Some(entry) = self.outbox.find_by_digest(&outcome.digest).await? else {
            debug!(span_id = %span.id, "Span left the outbox before upload");
            return Ok(outcome);
        };

        match self.upload_one(&entry).await {
            Ok(UploadOutcome::Delivered(_)) => outcome.confirmed = true,
            Ok(UploadOutcome::Abandoned { .. }) => {}
            Err(ClientError::NotEnrolled) => {
                debug!(span_id = %span.id, "Not enrolled, span stays queued");
            }
            Err(e) => {
                warn!(span_id = %span.id, error = %e, "Immediate upload failed, span stays queued");
            }
        }

        Ok(outcome)
    }

    /// Attempt delivery of one outbox entry
    ///
    /// Undecodable entries are quarantined and reported as `Abandoned`.
    /// Network failures and non-2xx answers reschedule the entry with backoff
    /// and return the error. Without a token this fails fast with
    /// [`ClientError::NotEnrolled`] and leaves the entry untouched.
    pub async fn upload_one(&self, entry: &OutboxEntry) -> Result<UploadOutcome> {
        let token = self.bearer().await?;

        let span = match Span::from_json(entry.serialized_span.as_bytes()) {
            Ok(span) if span.is_signed() => span,
            Ok(_) => return self.abandon(entry, "queued span is not signed").await,
            Err(e) => {
                return self
                    .abandon(entry, &format!("undecodable span: {}", e))
                    .await
            }
        };

        let tenant = match span.metadata.tenant_id.clone() {
            Some(tenant) => Some(tenant),
            None => self.credentials.read().await.tenant_id.clone(),
        };

        let mut request = self
            .http
            .post(self.url("/api/spans"))
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_TYPE, "application/json")
            .body(entry.serialized_span.clone());

        if let Some(tenant) = tenant {
            request = request.header(IDEMPOTENCY_HEADER, idempotency_key(&tenant, &entry.digest));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                self.record_failure(entry).await;
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            self.record_failure(entry).await;
            return Err(ClientError::ServerRejected {
                status: status.as_u16(),
                message,
            });
        }

        let ack: IngestResponse = match response.json().await {
            Ok(ack) => ack,
            Err(e) => {
                self.record_failure(entry).await;
                return Err(ClientError::InvalidResponse(format!(
                    "failed to parse ingest response: {}",
                    e
                )));
            }
        };

        self.outbox.mark_delivered(&entry.id).await?;
        info!(span_id = %entry.id, digest = %entry.digest, tries = entry.tries, "Span delivered");
        Ok(UploadOutcome::Delivered(ack))
    }

    async fn abandon(&self, entry: &OutboxEntry, reason: &str) -> Result<UploadOutcome> {
        self.outbox.quarantine(&entry.id, reason).await?;
        Ok(UploadOutcome::Abandoned {
            reason: reason.to_string(),
        })
    }

    /// Reschedule after a failed attempt, or dead-letter past the threshold
    async fn record_failure(&self, entry: &OutboxEntry) {
        let tries = entry.tries.saturating_add(1);
        let result = match self.config.max_tries {
            Some(max) if tries >= max => {
                let reason = format!("gave up after {} delivery attempts", tries);
                self.outbox.quarantine(&entry.id, &reason).await
            }
            _ => self
                .outbox
                .mark_failed(&entry.id, &self.config.backoff)
                .await
                .map(|next| {
                    debug!(span_id = %entry.id, tries, next_attempt_at = %next, "Upload failed, retry scheduled");
                }),
        };

        if let Err(e) = result {
            error!(span_id = %entry.id, error = %e, "Failed to record delivery failure");
        }
    }

    /// Upload due entries until the outbox is empty, `max_batch` entries
    /// have been tried, or an upload fails
    ///
    /// Only one drain runs at a time; a concurrent call returns
    /// [`DrainOutcome::AlreadyRunning`] immediately.
    pub async fn drain(&self) -> Result<DrainOutcome> {
        let Ok(_gate) = self.drain_gate.try_lock() else {
            debug!("Drain already running");
            return Ok(DrainOutcome::AlreadyRunning);
        };

        // Fail fast without touching the queue
        self.bearer().await?;

        let mut report = DrainReport::default();
        while report.attempted < self.config.max_batch {
            let Some(entry) = self.outbox.next_ready().await? else {
                break;
            };

            report.attempted += 1;
            match self.upload_one(&entry).await {
                Ok(UploadOutcome::Delivered(_)) => report.delivered += 1,
                Ok(UploadOutcome::Abandoned { .. }) => report.abandoned += 1,
                Err(e) => {
                    warn!(span_id = %entry.id, error = %e, "Drain stopped on failed upload");
                    report.failure = Some(e.to_string());
                    break;
                }
            }
        }

        report.remaining = self.outbox.pending_count().await?;
        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            abandoned = report.abandoned,
            remaining = report.remaining,
            "Drain finished"
        );
        Ok(DrainOutcome::Completed(report))
    }

    /// Register this device with the ledger
    ///
    /// On success the returned credentials are persisted and the bearer
    /// token used by later requests is swapped in place.
    pub async fn enroll(&self, pubkey_hex: &str, fingerprint: &str) -> Result<EnrollResponse> {
        let body = EnrollRequest {
            pubkey: pubkey_hex.to_string(),
            device_fingerprint: fingerprint.to_string(),
        };

        let response = self
            .http
            .post(self.url("/api/enroll"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::ServerRejected {
                status: status.as_u16(),
                message,
            });
        }

        let enrolled: EnrollResponse = response.json().await.map_err(|e| {
            ClientError::InvalidResponse(format!("failed to parse enroll response: {}", e))
        })?;

        let mut credentials = self.credentials.write().await;
        let updated = Credentials {
            device_token: Some(enrolled.token.clone()),
            device_id: Some(enrolled.device_id.clone()),
            tenant_id: Some(enrolled.tenant_id.clone()),
            owner_id: Some(enrolled.owner_id.clone()),
            current_policy: credentials.current_policy.clone(),
        };
        updated.save(self.credential_store.as_ref()).await?;
        *credentials = updated;
        drop(credentials);

        if !self.token_provider.replace(enrolled.token.clone()).await {
            warn!("Token provider is fixed; enrolled token will apply after restart");
        }

        info!(
            device_id = %enrolled.device_id,
            tenant_id = %enrolled.tenant_id,
            "Device enrolled"
        );
        Ok(enrolled)
    }

    /// Store a new policy document in the credential table
    pub async fn store_policy(&self, policy_json: &str) -> Result<()> {
        self.credential_store
            .set(notary_outbox::credentials::KEY_CURRENT_POLICY, policy_json)
            .await?;
        self.credentials.write().await.current_policy = Some(policy_json.to_string());
        Ok(())
    }

    /// Fetch a named manifest as raw bytes
    pub async fn fetch_manifest(&self, name: &str) -> Result<Bytes> {
        let token = self.bearer().await?;
        let url = self.url(&format!("/manifest/{}", name));
        debug!(url = %url, "Fetching manifest");

        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::ServerRejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.bytes().await?)
    }

    /// Subscribe to the timeline event stream
    ///
    /// The returned stream connects on first poll and reconnects a bounded
    /// number of times if the connection drops.
    pub async fn stream_events(&self, params: &[(&str, &str)]) -> Result<EventStream> {
        let token = self.bearer().await?;
        let params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(event_stream(
            self.stream_http.clone(),
            self.url("/api/timeline/stream"),
            token,
            params,
            self.config.stream_max_reconnects,
            self.config.stream_reconnect_delay,
        ))
    }
}
