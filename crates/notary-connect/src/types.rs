//! Request/response bodies and client configuration

use notary_outbox::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`crate::NotaryClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Ledger base URL, e.g. `https://ledger.example.com`
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Whole-request timeout for non-streaming calls
    pub request_timeout: Duration,
    /// Upload attempts per drain
    pub max_batch: usize,
    /// Quarantine an entry once it has failed this many times; `None` retries forever
    pub max_tries: Option<u32>,
    pub backoff: BackoffPolicy,
    /// Reconnects allowed after the event stream drops
    pub stream_max_reconnects: u32,
    pub stream_reconnect_delay: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    pub fn with_max_tries(mut self, max_tries: Option<u32>) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_stream_reconnects(mut self, max: u32, delay: Duration) -> Self {
        self.stream_max_reconnects = max;
        self.stream_reconnect_delay = delay;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            max_batch: 10,
            max_tries: None,
            backoff: BackoffPolicy::default(),
            stream_max_reconnects: 5,
            stream_reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Ledger acknowledgement for an uploaded span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<String>,
    pub digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollRequest {
    pub pubkey: String,
    pub device_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollResponse {
    pub device_id: String,
    pub tenant_id: String,
    pub owner_id: String,
    pub token: String,
}

/// Result of [`crate::NotaryClient::ingest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub id: String,
    pub digest: String,
    /// True when the immediate upload was acknowledged by the ledger
    pub confirmed: bool,
}

/// Result of a single upload attempt that did not error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Delivered(IngestResponse),
    /// Entry was moved to the dead-letter table
    Abandoned { reason: String },
}

/// Tally of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    pub abandoned: usize,
    /// Error that stopped the pass early, if any
    pub failure: Option<String>,
    /// Entries left in the outbox afterwards
    pub remaining: usize,
}

impl DrainReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of [`crate::NotaryClient::drain`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain holds the gate
    AlreadyRunning,
    Completed(DrainReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_batch, 10);
        assert_eq!(config.max_tries, None);
    }

    #[test]
    fn test_ingest_response_optional_accepted_at() {
        let r: IngestResponse = serde_json::from_str(r#"{"id":"a","digest":"b3:00"}"#).unwrap();
        assert_eq!(r.accepted_at, None);

        let r: IngestResponse = serde_json::from_str(
            r#"{"id":"a","accepted_at":"2025-10-31T18:00:00Z","digest":"b3:00"}"#,
        )
        .unwrap();
        assert_eq!(r.accepted_at.as_deref(), Some("2025-10-31T18:00:00Z"));
    }

    #[test]
    fn test_enroll_request_wire_names() {
        let body = serde_json::to_string(&EnrollRequest {
            pubkey: "ab".into(),
            device_fingerprint: "fp".into(),
        })
        .unwrap();
        assert_eq!(body, r#"{"pubkey":"ab","device_fingerprint":"fp"}"#);
    }
}
