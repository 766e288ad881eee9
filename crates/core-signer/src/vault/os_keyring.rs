//! Device key held in the platform credential store
//! (macOS Keychain, Windows Credential Manager, Secret Service / keyutils)

use super::KeyVault;
use crate::error::{Result, SignerError};
use tracing::debug;
use zeroize::Zeroizing;

const ACCOUNT: &str = "device-signing-key";

/// Key vault backed by the OS keyring
pub struct KeyringVault {
    service: String,
}

impl KeyringVault {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self) -> Result<::keyring::Entry> {
        ::keyring::Entry::new(&self.service, ACCOUNT).map_err(|e| SignerError::Keyring(e.to_string()))
    }
}

impl KeyVault for KeyringVault {
    fn load(&self) -> Result<Option<Zeroizing<[u8; 32]>>> {
        let secret = match self.entry()?.get_password() {
            Ok(secret) => Zeroizing::new(secret),
            Err(::keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(SignerError::Keyring(e.to_string())),
        };

        let mut seed = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(secret.trim(), &mut seed[..])
            .map_err(|_| SignerError::InvalidKey("keyring entry is not a 32-byte hex seed".to_string()))?;

        debug!(service = %self.service, "Loaded device key from keyring");
        Ok(Some(seed))
    }

    fn store(&self, seed: &[u8; 32]) -> Result<()> {
        let secret = Zeroizing::new(hex::encode(seed));
        self.entry()?
            .set_password(&secret)
            .map_err(|e| SignerError::Keyring(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "keyring"
    }
}
