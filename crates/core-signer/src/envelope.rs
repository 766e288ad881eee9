//! Stamping and verifying span signatures

use crate::error::{Result, SignerError};
use crate::{SpanSigner, ALGORITHM_ED25519};
use ed25519_dalek::{Signature as DalekSignature, VerifyingKey};
use notary_core_envelope::{span_digest, Signature, Span};
use tracing::debug;

/// Sign a span in place
///
/// The digest covers the canonical form with any previous digest and
/// signature removed, so re-signing replaces rather than nests.
pub fn sign_span<S: SpanSigner + ?Sized>(span: &mut Span, signer: &S) -> Result<()> {
    let (digest, raw) = span_digest(span)?;
    let sig = signer.sign(&raw)?;
    let pubkey = signer.public_key()?;

    debug!(span_id = %span.id, digest = %digest, "Signed span");

    span.digest = Some(digest);
    span.signature = Some(Signature {
        algo: signer.algorithm().to_string(),
        pubkey_hex: hex::encode(pubkey),
        sig_hex: hex::encode(sig),
    });
    Ok(())
}

/// Verify a signed span against its embedded public key
pub fn verify_span(span: &Span) -> Result<()> {
    let (Some(stamped), Some(signature)) = (&span.digest, &span.signature) else {
        return Err(SignerError::Unsigned {
            id: span.id.clone(),
        });
    };

    if signature.algo != ALGORITHM_ED25519 {
        return Err(SignerError::UnsupportedAlgorithm(signature.algo.clone()));
    }

    let (actual, raw) = span_digest(span)?;
    if &actual != stamped {
        return Err(SignerError::DigestMismatch {
            expected: stamped.clone(),
            actual,
        });
    }

    let mut pubkey = [0u8; 32];
    hex::decode_to_slice(&signature.pubkey_hex, &mut pubkey)
        .map_err(|e| SignerError::InvalidKey(format!("public key: {}", e)))?;
    let verifying_key = VerifyingKey::from_bytes(&pubkey)
        .map_err(|e| SignerError::InvalidKey(format!("public key: {}", e)))?;

    let mut sig = [0u8; 64];
    hex::decode_to_slice(&signature.sig_hex, &mut sig).map_err(|_| SignerError::BadSignature {
        id: span.id.clone(),
    })?;

    verifying_key
        .verify_strict(&raw, &DalekSignature::from_bytes(&sig))
        .map_err(|_| SignerError::BadSignature {
            id: span.id.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ed25519Signer;
    use notary_core_envelope::Metadata;

    fn span() -> Span {
        Span::new(
            "span-1",
            "activity",
            "observer",
            "focused",
            "device:a",
            "complete",
            Metadata::at("2025-10-31T18:00:00Z"),
            "private",
        )
    }

    #[test]
    fn test_sign_then_verify() {
        let signer = Ed25519Signer::generate();
        let mut s = span();
        sign_span(&mut s, &signer).unwrap();

        assert!(s.is_signed());
        let sig = s.signature.as_ref().unwrap();
        assert_eq!(sig.algo, "ed25519");
        assert_eq!(sig.pubkey_hex, signer.public_key_hex());
        assert_eq!(sig.sig_hex.len(), 128);
        verify_span(&s).unwrap();
    }

    #[test]
    fn test_resign_is_stable() {
        let signer = Ed25519Signer::from_seed(&[3u8; 32]);
        let mut s = span();
        sign_span(&mut s, &signer).unwrap();
        let first = s.clone();

        sign_span(&mut s, &signer).unwrap();
        assert_eq!(s, first);
    }

    #[test]
    fn test_tampered_field_fails() {
        let signer = Ed25519Signer::generate();
        let mut s = span();
        sign_span(&mut s, &signer).unwrap();

        s.status = "failed".into();
        assert!(matches!(
            verify_span(&s),
            Err(SignerError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_forged_digest_fails_signature() {
        let signer = Ed25519Signer::generate();
        let mut s = span();
        sign_span(&mut s, &signer).unwrap();

        // Re-stamp a matching digest for altered content, keep the old signature
        s.status = "failed".into();
        let (d, _) = span_digest(&s).unwrap();
        s.digest = Some(d);
        assert!(matches!(
            verify_span(&s),
            Err(SignerError::BadSignature { .. })
        ));
    }

    #[test]
    fn test_unsigned_rejected() {
        assert!(matches!(
            verify_span(&span()),
            Err(SignerError::Unsigned { .. })
        ));
    }
}
