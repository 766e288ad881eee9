//! The span envelope: one structured fact submitted for notarization

use crate::canonical;
use crate::error::{EnvelopeError, Result};
use crate::value::ValueMap;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Signature block stamped onto a signed span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signature algorithm name, e.g. `ed25519`
    pub algo: String,
    /// Hex-encoded public key of the signer
    #[serde(rename = "pubkey")]
    pub pubkey_hex: String,
    /// Hex-encoded signature over the raw digest bytes
    #[serde(rename = "sig")]
    pub sig_hex: String,
}

/// Provenance metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// ISO-8601 timestamp, carried verbatim and never re-parsed
    #[serde(rename = "ts")]
    pub timestamp: String,
}

impl Metadata {
    /// Metadata with only a timestamp
    pub fn at<S: Into<String>>(timestamp: S) -> Self {
        Self {
            tenant_id: None,
            owner_id: None,
            device_id: None,
            timestamp: timestamp.into(),
        }
    }

    /// Metadata stamped with the current UTC time
    pub fn now() -> Self {
        Self::at(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// A span envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(default)]
    pub id: String,
    pub entity_type: String,
    pub who: String,
    pub did: String,
    pub this: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ValueMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ValueMap>,
    pub metadata: Metadata,
    pub visibility: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Span {
    /// Create an unsigned span with empty payload maps
    pub fn new(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        who: impl Into<String>,
        did: impl Into<String>,
        this: impl Into<String>,
        status: impl Into<String>,
        metadata: Metadata,
        visibility: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            who: who.into(),
            did: did.into(),
            this: this.into(),
            status: status.into(),
            input: None,
            output: None,
            metadata,
            visibility: visibility.into(),
            digest: None,
            signature: None,
        }
    }

    pub fn with_input(mut self, input: ValueMap) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: ValueMap) -> Self {
        self.output = Some(output);
        self
    }

    /// Decode a span from JSON bytes
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let span: Span = serde_json::from_slice(bytes)?;
        if span.metadata.timestamp.is_empty() {
            return Err(EnvelopeError::missing_field("metadata.ts"));
        }
        Ok(span)
    }

    /// Assign a fresh UUID if the caller left the id empty
    ///
    /// Returns true when an id was generated.
    pub fn ensure_id(&mut self) -> bool {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
            true
        } else {
            false
        }
    }

    /// True when both digest and signature are present
    pub fn is_signed(&self) -> bool {
        self.digest.is_some() && self.signature.is_some()
    }

    /// Copy of this span with digest and signature cleared
    pub fn unsigned(&self) -> Span {
        let mut copy = self.clone();
        copy.digest = None;
        copy.signature = None;
        copy
    }

    /// Check the digest/signature pairing invariant
    pub fn check_signing_state(&self) -> Result<()> {
        if self.digest.is_some() != self.signature.is_some() {
            return Err(EnvelopeError::HalfSigned {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Canonical bytes of the full span, digest and signature included
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        canonical::canonicalize(self)
    }

    /// Validate every float in the payload maps
    pub(crate) fn ensure_finite(&self) -> Result<()> {
        for (name, map) in [("input", &self.input), ("output", &self.output)] {
            if let Some(map) = map {
                for (k, v) in map {
                    v.ensure_finite(&format!("{}.{}", name, k))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn sample() -> Span {
        Span::new(
            "span-001",
            "activity",
            "observer:menubar@1.0.0",
            "focused",
            "device:test-device",
            "complete",
            Metadata {
                tenant_id: Some("tenant-123".into()),
                owner_id: Some("owner-456".into()),
                device_id: Some("device-789".into()),
                timestamp: "2025-10-31T18:00:00Z".into(),
            },
            "private",
        )
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains("\"entity_type\":\"activity\""));
        assert!(json.contains("\"tenant_id\":\"tenant-123\""));
        assert!(json.contains("\"ts\":\"2025-10-31T18:00:00Z\""));
        assert!(!json.contains("digest"));
        assert!(!json.contains("signature"));
        assert!(!json.contains("input"));
    }

    #[test]
    fn test_decode_round_trip() {
        let mut input = ValueMap::new();
        input.insert("app".into(), Value::from("Xcode"));
        let span = sample().with_input(input);

        let bytes = serde_json::to_vec(&span).unwrap();
        let decoded = Span::from_json(&bytes).unwrap();
        assert_eq!(decoded, span);
    }

    #[test]
    fn test_decode_rejects_missing_metadata() {
        let err = Span::from_json(br#"{"id":"x","entity_type":"a"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::Json(_)));
    }

    #[test]
    fn test_decode_rejects_empty_timestamp() {
        let mut span = sample();
        span.metadata.timestamp.clear();
        let bytes = serde_json::to_vec(&span).unwrap();
        assert!(matches!(
            Span::from_json(&bytes),
            Err(EnvelopeError::MissingField { .. })
        ));
    }

    #[test]
    fn test_ensure_id() {
        let mut span = sample();
        assert!(!span.ensure_id());
        assert_eq!(span.id, "span-001");

        span.id.clear();
        assert!(span.ensure_id());
        assert_eq!(span.id.len(), 36);
    }

    #[test]
    fn test_half_signed_detected() {
        let mut span = sample();
        assert!(span.check_signing_state().is_ok());

        span.digest = Some("b3:00".into());
        assert!(matches!(
            span.check_signing_state(),
            Err(EnvelopeError::HalfSigned { .. })
        ));
    }

    #[test]
    fn test_metadata_now_is_utc() {
        let meta = Metadata::now();
        assert!(meta.timestamp.ends_with('Z'));
    }
}
