//! Bearer token handling.
//!
//! The device token arrives at enrollment time, after the client already
//! exists, so the default provider is a shared slot that enrollment fills in.

use std::sync::Arc;
use tokio::sync::RwLock;

/// Token provider for ledger authentication.
#[derive(Debug, Clone)]
pub enum TokenProvider {
    /// Fixed token (from config or tests).
    Static(String),

    /// Token slot updated in place on enrollment.
    Shared(Arc<RwLock<Option<String>>>),

    /// No authentication.
    None,
}

impl TokenProvider {
    /// Create a static token provider.
    pub fn static_token(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    /// Create a shared slot, optionally pre-filled.
    pub fn shared(initial: Option<String>) -> Self {
        Self::Shared(Arc::new(RwLock::new(initial.filter(|t| !t.is_empty()))))
    }

    /// Get the current token, if any.
    pub async fn get_token(&self) -> Option<String> {
        match self {
            Self::Static(token) => Some(token.clone()),
            Self::Shared(slot) => slot.read().await.clone(),
            Self::None => None,
        }
    }

    /// Swap in a new token.
    ///
    /// Returns false for providers that cannot be updated.
    pub async fn replace(&self, token: String) -> bool {
        match self {
            Self::Shared(slot) => {
                *slot.write().await = Some(token);
                true
            }
            _ => false,
        }
    }
}

impl Default for TokenProvider {
    fn default() -> Self {
        Self::shared(None)
    }
}
