//! BLAKE3 content digests
//!
//! Digests are rendered as `b3:` followed by 64 lowercase hex characters.

use crate::canonical;
use crate::error::{EnvelopeError, Result};
use crate::span::Span;

/// Prefix identifying the digest algorithm
pub const DIGEST_PREFIX: &str = "b3:";

/// Raw 32-byte BLAKE3 hash of `bytes`
pub fn digest_bytes(bytes: &[u8]) -> [u8; 32] {
    *blake3::hash(bytes).as_bytes()
}

/// Prefixed hex digest of `bytes`
pub fn digest(bytes: &[u8]) -> String {
    format!("{}{}", DIGEST_PREFIX, hex::encode(digest_bytes(bytes)))
}

/// Digest of the span's unsigned canonical form, as both string and raw bytes
pub fn span_digest(span: &Span) -> Result<(String, [u8; 32])> {
    let bytes = canonical::canonicalize_unsigned(span)?;
    let raw = digest_bytes(&bytes);
    Ok((format!("{}{}", DIGEST_PREFIX, hex::encode(raw)), raw))
}

/// Parse a prefixed digest back into raw bytes
pub fn parse_digest(s: &str) -> Result<[u8; 32]> {
    let hex_part = s
        .strip_prefix(DIGEST_PREFIX)
        .ok_or_else(|| EnvelopeError::InvalidDigest(s.to_string()))?;
    if hex_part.len() != 64 || hex_part.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(EnvelopeError::InvalidDigest(s.to_string()));
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(hex_part, &mut out)
        .map_err(|_| EnvelopeError::InvalidDigest(s.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // BLAKE3 of the empty input
        assert_eq!(
            digest(b""),
            "b3:af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn test_digest_format() {
        let d = digest(b"hello");
        assert!(d.starts_with("b3:"));
        assert_eq!(d.len(), 67);
        assert!(d[3..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_parse_round_trip() {
        let d = digest(b"payload");
        assert_eq!(parse_digest(&d).unwrap(), digest_bytes(b"payload"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_digest("sha256:00").is_err());
        assert!(parse_digest("b3:abcd").is_err());
        let upper = digest(b"x").to_uppercase().replacen("B3:", "b3:", 1);
        assert!(parse_digest(&upper).is_err());
    }
}
