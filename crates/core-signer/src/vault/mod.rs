//! Persistent storage for the device signing key
//!
//! The notary keeps one Ed25519 key per device. A [`KeyVault`] only knows how
//! to load and store the 32-byte seed; [`VaultSigner::open`] turns a vault
//! into a signer, generating and storing a key the first time round so the
//! same identity survives restarts.
//!
//! Two backends ship:
//!
//! - [`KeyringVault`]: the platform credential store (feature `os-keyring`)
//! - [`EncryptedFileVault`]: a passphrase-sealed file on disk

mod file;
#[cfg(feature = "os-keyring")]
mod os_keyring;

pub use file::{EncryptedFileVault, KdfParams};
#[cfg(feature = "os-keyring")]
pub use os_keyring::KeyringVault;

use crate::ed25519::Ed25519Signer;
use crate::error::{Result, SignerError};
use crate::SpanSigner;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::info;
use zeroize::Zeroizing;

/// Load/store capability for the device key seed
pub trait KeyVault: Send + Sync {
    /// Return the stored seed, or `None` if no key has been stored yet
    fn load(&self) -> Result<Option<Zeroizing<[u8; 32]>>>;

    /// Persist the seed, replacing any previous one
    fn store(&self, seed: &[u8; 32]) -> Result<()>;

    /// Short backend name for logs and health output
    fn name(&self) -> &'static str;
}

/// Which vault backend to open at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultKind {
    #[default]
    Keyring,
    File,
}

impl FromStr for VaultKind {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "keyring" => Ok(VaultKind::Keyring),
            "file" => Ok(VaultKind::File),
            other => Err(SignerError::VaultUnavailable(other.to_string())),
        }
    }
}

impl fmt::Display for VaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultKind::Keyring => write!(f, "keyring"),
            VaultKind::File => write!(f, "file"),
        }
    }
}

/// Settings needed to open a vault
#[derive(Clone)]
pub struct VaultOptions {
    pub kind: VaultKind,
    /// Sealed key location for the file vault
    pub key_file: PathBuf,
    /// Passphrase for the file vault
    pub passphrase: Option<Zeroizing<String>>,
    /// Keyring service name
    pub service: String,
}

impl VaultOptions {
    pub fn new(kind: VaultKind, key_file: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            key_file: key_file.into(),
            passphrase: None,
            service: "notary".to_string(),
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }
}

impl fmt::Debug for VaultOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultOptions")
            .field("kind", &self.kind)
            .field("key_file", &self.key_file)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("service", &self.service)
            .finish()
    }
}

/// Open the vault selected by `options`
pub fn open_vault(options: &VaultOptions) -> Result<Box<dyn KeyVault>> {
    match options.kind {
        #[cfg(feature = "os-keyring")]
        VaultKind::Keyring => Ok(Box::new(KeyringVault::new(&options.service))),
        #[cfg(not(feature = "os-keyring"))]
        VaultKind::Keyring => Err(SignerError::VaultUnavailable("keyring".to_string())),
        VaultKind::File => {
            let passphrase = options
                .passphrase
                .as_ref()
                .ok_or(SignerError::MissingPassphrase)?;
            Ok(Box::new(EncryptedFileVault::new(
                &options.key_file,
                passphrase.as_str(),
            )))
        }
    }
}

/// Vault held entirely in memory, for tests and throwaway identities
#[derive(Default)]
pub struct MemoryVault {
    seed: Mutex<Option<Zeroizing<[u8; 32]>>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyVault for MemoryVault {
    fn load(&self) -> Result<Option<Zeroizing<[u8; 32]>>> {
        let guard = self
            .seed
            .lock()
            .map_err(|_| SignerError::Crypto("memory vault lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn store(&self, seed: &[u8; 32]) -> Result<()> {
        let mut guard = self
            .seed
            .lock()
            .map_err(|_| SignerError::Crypto("memory vault lock poisoned".to_string()))?;
        *guard = Some(Zeroizing::new(*seed));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Signer whose key lives in a [`KeyVault`]
#[derive(Debug, Clone)]
pub struct VaultSigner {
    inner: Ed25519Signer,
    source: &'static str,
}

impl VaultSigner {
    /// Load the device key from `vault`, generating and storing one if absent
    pub fn open(vault: &dyn KeyVault) -> Result<Self> {
        let inner = match vault.load()? {
            Some(seed) => Ed25519Signer::from_seed(&seed),
            None => {
                let signer = Ed25519Signer::generate();
                vault.store(&signer.seed())?;
                info!(
                    vault = vault.name(),
                    public_key = %signer.public_key_hex(),
                    "Generated new device signing key"
                );
                signer
            }
        };

        Ok(Self {
            inner,
            source: vault.name(),
        })
    }

    /// Name of the vault the key came from
    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn public_key_hex(&self) -> String {
        self.inner.public_key_hex()
    }
}

impl SpanSigner for VaultSigner {
    fn public_key(&self) -> Result<[u8; 32]> {
        self.inner.public_key()
    }

    fn sign(&self, digest: &[u8; 32]) -> Result<[u8; 64]> {
        self.inner.sign(digest)
    }

    fn algorithm(&self) -> &'static str {
        self.inner.algorithm()
    }
}
