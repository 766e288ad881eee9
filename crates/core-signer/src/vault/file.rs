//! Passphrase-sealed key file
//!
//! The seed is encrypted with ChaCha20-Poly1305 under a key derived from the
//! passphrase with Argon2id. The file is JSON so the KDF parameters travel
//! with the ciphertext and can be raised later without breaking old files.

use super::KeyVault;
use crate::error::{Result, SignerError};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroizing;

const FORMAT_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // 64 MiB, 3 passes, 4 lanes
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedKey {
    version: u32,
    kdf: KdfParams,
    salt: String,
    nonce: String,
    ciphertext: String,
}

/// Key vault backed by an encrypted file
pub struct EncryptedFileVault {
    path: PathBuf,
    passphrase: Zeroizing<String>,
    params: KdfParams,
}

impl EncryptedFileVault {
    pub fn new(path: impl AsRef<Path>, passphrase: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            passphrase: Zeroizing::new(passphrase.to_string()),
            params: KdfParams::default(),
        }
    }

    /// Override the KDF cost used when sealing
    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.params = params;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn derive(&self, salt: &[u8], params: &KdfParams) -> Result<Zeroizing<[u8; 32]>> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(32),
        )
        .map_err(|e| SignerError::Crypto(format!("invalid Argon2 params: {}", e)))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key[..])
            .map_err(|e| SignerError::Crypto(format!("key derivation failed: {}", e)))?;
        Ok(key)
    }

    fn unseal_error(&self) -> SignerError {
        SignerError::Unseal {
            path: self.path.display().to_string(),
        }
    }
}

impl KeyVault for EncryptedFileVault {
    fn load(&self) -> Result<Option<Zeroizing<[u8; 32]>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let sealed: SealedKey = serde_json::from_slice(&fs::read(&self.path)?)?;
        if sealed.version != FORMAT_VERSION {
            return Err(SignerError::InvalidKey(format!(
                "unsupported key file version {}",
                sealed.version
            )));
        }

        let salt = hex::decode(&sealed.salt).map_err(|_| self.unseal_error())?;
        let nonce = hex::decode(&sealed.nonce).map_err(|_| self.unseal_error())?;
        let ciphertext = hex::decode(&sealed.ciphertext).map_err(|_| self.unseal_error())?;
        if nonce.len() != NONCE_LEN {
            return Err(self.unseal_error());
        }

        let kek = self.derive(&salt, &sealed.kdf)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(kek.as_slice()));
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
                .map_err(|_| self.unseal_error())?,
        );

        if plaintext.len() != 32 {
            return Err(SignerError::InvalidKey(format!(
                "sealed seed has {} bytes",
                plaintext.len()
            )));
        }
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&plaintext);

        debug!(path = %self.path.display(), "Unsealed device key");
        Ok(Some(seed))
    }

    fn store(&self, seed: &[u8; 32]) -> Result<()> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let kek = self.derive(&salt, &self.params)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(kek.as_slice()));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), seed.as_slice())
            .map_err(|e| SignerError::Crypto(format!("encryption failed: {}", e)))?;

        let sealed = SealedKey {
            version: FORMAT_VERSION,
            kdf: self.params,
            salt: hex::encode(salt),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write beside the target then rename so a crash never leaves half a key
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&sealed)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), "Sealed device key");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
