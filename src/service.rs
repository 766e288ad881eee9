/*!
 * Notary service facade
 *
 * The operations the capture agent and UI call: queue a span, report
 * health, force a drain, enroll, and update the policy. Replies are plain
 * serializable values so any request/response transport can carry them.
 */

use std::sync::Arc;

use notary_connect::{DrainOutcome, EventStream, IngestOutcome, NotaryClient};
use notary_core_envelope::Span;
use notary_core_signer::{open_vault, SpanSigner, VaultSigner};
use notary_outbox::SqliteStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::NotaryConfig;
use crate::error::{NotaryError, Result};

/// Service name reported by [`NotaryService::health`]
pub const SERVICE_NAME: &str = "notary";

/// Success flag plus an optional error message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
        }
    }
}

/// Health report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// `ok`, or `degraded` when the outbox could not be read
    pub status: String,
    pub service: String,
    pub version: String,
    pub enrolled: bool,
    /// `active` once a signing key is loaded
    pub signer: String,
    /// Vault the signing key came from
    pub key_vault: String,
    #[serde(rename = "outbox_pending")]
    pub pending_count: usize,
    /// Enrolled device id, or `none`
    pub device_id: String,
}

/// Facade over the ledger client and its outbox
pub struct NotaryService {
    client: NotaryClient,
    key_vault: &'static str,
}

impl NotaryService {
    /// Open the outbox and key vault named by `config` and build the client
    pub async fn open(config: &NotaryConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(config.database_path()).await?);

        let vault = open_vault(&config.vault_options())?;
        let signer = VaultSigner::open(vault.as_ref())?;
        let key_vault = signer.source();
        info!(
            key_vault,
            public_key = %signer.public_key_hex(),
            "Loaded device signing key"
        );

        let client = NotaryClient::new(config.client_config(), Arc::new(signer), store).await?;
        Ok(Self::new(client, key_vault))
    }

    /// Build the service over an explicit signer and store
    pub async fn with_parts(
        config: &NotaryConfig,
        signer: Arc<dyn SpanSigner>,
        store: Arc<SqliteStore>,
        key_vault: &'static str,
    ) -> Result<Self> {
        let client = NotaryClient::new(config.client_config(), signer, store).await?;
        Ok(Self::new(client, key_vault))
    }

    /// Wrap an existing client
    pub fn new(client: NotaryClient, key_vault: &'static str) -> Self {
        Self { client, key_vault }
    }

    pub fn client(&self) -> &NotaryClient {
        &self.client
    }

    /// Sign and queue a serialized span
    ///
    /// Requires enrollment. Missing tenant, owner and device metadata are
    /// filled in from the stored credentials before signing.
    pub async fn enqueue_span(&self, bytes: &[u8]) -> Reply {
        match self.try_enqueue_span(bytes).await {
            Ok(outcome) => {
                debug!(
                    span_id = %outcome.id,
                    digest = %outcome.digest,
                    confirmed = outcome.confirmed,
                    "Span accepted"
                );
                Reply::ok()
            }
            Err(e) => {
                warn!(error = %e, category = %e.category(), "Failed to enqueue span");
                Reply::failed(e)
            }
        }
    }

    async fn try_enqueue_span(&self, bytes: &[u8]) -> Result<IngestOutcome> {
        if !self.client.is_enrolled().await {
            return Err(NotaryError::NotEnrolled);
        }

        let mut span = Span::from_json(bytes)?;
        let creds = self.client.credentials().await;
        let metadata = &mut span.metadata;
        if metadata.tenant_id.is_none() {
            metadata.tenant_id = creds.tenant_id;
        }
        if metadata.owner_id.is_none() {
            metadata.owner_id = creds.owner_id;
        }
        if metadata.device_id.is_none() {
            metadata.device_id = creds.device_id;
        }

        Ok(self.client.ingest(span).await?)
    }

    pub async fn health(&self) -> Health {
        let creds = self.client.credentials().await;
        let (status, pending_count) = match self.client.outbox().pending_count().await {
            Ok(count) => ("ok", count),
            Err(e) => {
                warn!(error = %e, "Cannot read outbox for health report");
                ("degraded", 0)
            }
        };

        Health {
            status: status.to_string(),
            service: SERVICE_NAME.to_string(),
            version: crate::VERSION.to_string(),
            enrolled: self.client.is_enrolled().await,
            signer: "active".to_string(),
            key_vault: self.key_vault.to_string(),
            pending_count,
            device_id: creds.device_id.unwrap_or_else(|| "none".to_string()),
        }
    }

    /// Number of spans still waiting for delivery
    pub async fn outbox_status(&self) -> Result<usize> {
        Ok(self.client.outbox().pending_count().await?)
    }

    /// Run one drain pass and report what happened
    pub async fn drain_now(&self) -> Result<DrainOutcome> {
        Ok(self.client.drain().await?)
    }

    /// Run one drain pass
    ///
    /// True when a pass ran to completion or one was already running.
    pub async fn drain(&self) -> bool {
        match self.drain_now().await {
            Ok(DrainOutcome::AlreadyRunning) => true,
            Ok(DrainOutcome::Completed(report)) => {
                if let Some(failure) = report.failure {
                    debug!(failure = %failure, "Drain pass stopped early");
                }
                true
            }
            Err(NotaryError::NotEnrolled) => {
                debug!("Skipping drain: device not enrolled");
                false
            }
            Err(e) => {
                warn!(error = %e, "Drain failed");
                false
            }
        }
    }

    /// Enroll this device using its signing key
    pub async fn enroll(&self, fingerprint: &str) -> Reply {
        let pubkey = match self.client.public_key_hex() {
            Ok(pubkey) => pubkey,
            Err(e) => return Reply::failed(NotaryError::from(e)),
        };

        match self.client.enroll(&pubkey, fingerprint).await {
            Ok(_) => Reply::ok(),
            Err(e) => {
                warn!(error = %e, "Enrollment failed");
                Reply::failed(NotaryError::from(e))
            }
        }
    }

    /// Validate and store a policy document
    pub async fn set_policy(&self, bytes: &[u8]) -> bool {
        let result: Result<()> = async {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| NotaryError::InvalidInput(format!("policy is not UTF-8: {}", e)))?;
            serde_json::from_str::<serde_json::Value>(text)?;
            self.client.store_policy(text).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                info!("Policy updated");
                true
            }
            Err(e) => {
                warn!(error = %e, "Rejected policy update");
                false
            }
        }
    }

    /// Fetch a named manifest from the ledger
    pub async fn fetch_manifest(&self, name: &str) -> Result<Vec<u8>> {
        Ok(self.client.fetch_manifest(name).await?.to_vec())
    }

    /// Subscribe to the ledger timeline
    pub async fn stream_events(&self, params: &[(&str, &str)]) -> Result<EventStream> {
        Ok(self.client.stream_events(params).await?)
    }

    pub fn public_key_hex(&self) -> Result<String> {
        Ok(self.client.public_key_hex()?)
    }

    pub fn signer_algorithm(&self) -> &'static str {
        self.client.signer_algorithm()
    }
}
