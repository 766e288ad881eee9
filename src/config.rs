/*!
 * Configuration types for the notary daemon
 */

use crate::error::{NotaryError, Result};
use notary_connect::ClientConfig;
use notary_core_signer::{VaultKind, VaultOptions};
use notary_outbox::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `base_url`
pub const ENV_BASE_URL: &str = "NOTARY_BASE_URL";

/// Environment variable holding the file vault passphrase
pub const ENV_KEY_PASSPHRASE: &str = "NOTARY_KEY_PASSPHRASE";

/// Main configuration for the notary daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotaryConfig {
    /// Ledger base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Directory for the outbox database and sealed key
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Outbox database path (None = `<data_dir>/outbox.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Seconds between scheduled drains
    #[serde(default = "default_drain_interval")]
    pub drain_interval_secs: u64,

    /// Upload attempts per drain
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retry delay after the first failed upload
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    /// Retry delay ceiling before jitter
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    /// Move a span to the dead-letter table after this many failed uploads
    /// (None = retry forever)
    #[serde(default)]
    pub dead_letter_after: Option<u32>,

    /// Where the device signing key is kept
    #[serde(default)]
    pub key_vault: VaultKind,

    /// Sealed key path for the file vault (None = `<data_dir>/device-key.json`)
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            data_dir: default_data_dir(),
            database_path: None,
            drain_interval_secs: default_drain_interval(),
            max_batch: default_max_batch(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            backoff_base_secs: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            dead_letter_after: None,
            key_vault: VaultKind::default(),
            key_file: None,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_base_url() -> String {
    "https://api.causable.dev".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notary")
}

fn default_drain_interval() -> u64 {
    30
}

fn default_max_batch() -> usize {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    60
}

fn default_backoff_base() -> u64 {
    60
}

fn default_backoff_max() -> u64 {
    1800
}

impl NotaryConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            NotaryError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: NotaryConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load from `path` if given, else defaults, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `NOTARY_BASE_URL` if set
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
    }

    /// Reject settings that would make the daemon misbehave
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(NotaryError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.drain_interval_secs == 0 {
            return Err(NotaryError::Config(
                "drain_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.max_batch == 0 {
            return Err(NotaryError::Config("max_batch must be at least 1".to_string()));
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(NotaryError::Config("timeouts must be at least 1 second".to_string()));
        }
        if self.backoff_base_secs == 0 || self.backoff_max_secs < self.backoff_base_secs {
            return Err(NotaryError::Config(format!(
                "backoff must satisfy 0 < base ({}) <= max ({})",
                self.backoff_base_secs, self.backoff_max_secs
            )));
        }
        if self.dead_letter_after == Some(0) {
            return Err(NotaryError::Config(
                "dead_letter_after must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("outbox.db"))
    }

    pub fn key_file(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("device-key.json"))
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.backoff_max_secs),
        )
    }

    /// Settings for the ledger client
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_batch: self.max_batch,
            max_tries: self.dead_letter_after,
            backoff: self.backoff_policy(),
            ..ClientConfig::default()
        }
    }

    /// Settings for opening the key vault; the passphrase comes from
    /// `NOTARY_KEY_PASSPHRASE` and is never read from the file
    pub fn vault_options(&self) -> VaultOptions {
        let options = VaultOptions::new(self.key_vault, self.key_file());
        match std::env::var(ENV_KEY_PASSPHRASE) {
            Ok(passphrase) if !passphrase.is_empty() => options.with_passphrase(passphrase),
            _ => options,
        }
    }
}
