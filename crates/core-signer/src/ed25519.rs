//! In-memory Ed25519 signer

use crate::error::{Result, SignerError};
use crate::{SpanSigner, ALGORITHM_ED25519};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroizing;

/// Ed25519 signer holding its key in process memory
///
/// The signing key is zeroized on drop and never printed.
#[derive(Clone)]
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a fresh key from the OS random number generator
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build a signer from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }

    /// Build a signer from a hex-encoded seed
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self> {
        let mut seed = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(seed_hex.trim(), &mut seed[..])
            .map_err(|e| SignerError::InvalidKey(format!("seed is not 32 hex bytes: {}", e)))?;
        Ok(Self::from_seed(&seed))
    }

    /// Copy of the seed, for handing to a key vault
    pub fn seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.key.to_bytes())
    }

    /// Hex-encoded public key
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }
}

impl SpanSigner for Ed25519Signer {
    fn public_key(&self) -> Result<[u8; 32]> {
        Ok(self.key.verifying_key().to_bytes())
    }

    fn sign(&self, digest: &[u8; 32]) -> Result<[u8; 64]> {
        Ok(self.key.sign(digest).to_bytes())
    }

    fn algorithm(&self) -> &'static str {
        ALGORITHM_ED25519
    }
}

// Prevent accidental Debug output of the signing key
impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &self.public_key_hex())
            .field("key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_signatures() {
        let signer = Ed25519Signer::from_seed(&[7u8; 32]);
        let digest = [1u8; 32];

        assert_eq!(signer.sign(&digest).unwrap(), signer.sign(&digest).unwrap());
        assert_ne!(signer.sign(&digest).unwrap(), signer.sign(&[2u8; 32]).unwrap());
    }

    #[test]
    fn test_seed_round_trip() {
        let signer = Ed25519Signer::generate();
        let restored = Ed25519Signer::from_seed(&signer.seed());
        assert_eq!(signer.public_key().unwrap(), restored.public_key().unwrap());

        let from_hex = Ed25519Signer::from_seed_hex(&hex::encode(*signer.seed())).unwrap();
        assert_eq!(from_hex.public_key_hex(), signer.public_key_hex());
    }

    #[test]
    fn test_bad_seed_hex() {
        assert!(matches!(
            Ed25519Signer::from_seed_hex("abcd"),
            Err(SignerError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = Ed25519Signer::from_seed(&[9u8; 32]);
        let seed_hex = hex::encode([9u8; 32]);
        let debug_output = format!("{:?}", signer);

        assert!(debug_output.contains("<redacted>"));
        assert!(!debug_output.contains(&seed_hex));
    }

    #[test]
    fn test_algorithm_name() {
        assert_eq!(Ed25519Signer::generate().algorithm(), "ed25519");
    }
}
