//! Error types for envelope encoding

use thiserror::Error;

/// Result type for envelope operations
pub type Result<T> = std::result::Result<T, EnvelopeError>;

/// Errors that can occur while encoding, decoding or digesting a span
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A float that JSON cannot represent (NaN or infinity)
    #[error("Non-finite float at {path}")]
    NonFiniteFloat { path: String },

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Digest string is not `b3:` followed by 64 lowercase hex characters
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Digest and signature must be set together
    #[error("Span {id} has a digest without a signature or vice versa")]
    HalfSigned { id: String },
}

impl EnvelopeError {
    /// Create a missing field error
    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        EnvelopeError::MissingField {
            field: field.into(),
        }
    }

    /// Create a non-finite float error for the given value path
    pub fn non_finite<S: Into<String>>(path: S) -> Self {
        EnvelopeError::NonFiniteFloat { path: path.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_error() {
        let err = EnvelopeError::missing_field("metadata.ts");
        assert!(matches!(err, EnvelopeError::MissingField { .. }));
        assert_eq!(err.to_string(), "Missing required field: metadata.ts");
    }

    #[test]
    fn test_non_finite_error_names_path() {
        let err = EnvelopeError::non_finite("input.ratio");
        assert!(err.to_string().contains("input.ratio"));
    }
}
