//! Device credentials kept in the outbox database's key-value table

use crate::error::Result;
use crate::CredentialStore;
use std::fmt;

pub const KEY_DEVICE_TOKEN: &str = "device_token";
pub const KEY_DEVICE_ID: &str = "device_id";
pub const KEY_TENANT_ID: &str = "tenant_id";
pub const KEY_OWNER_ID: &str = "owner_id";
pub const KEY_CURRENT_POLICY: &str = "current_policy";

/// Everything the device learns from enrollment, plus the active policy
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub device_token: Option<String>,
    pub device_id: Option<String>,
    pub tenant_id: Option<String>,
    pub owner_id: Option<String>,
    pub current_policy: Option<String>,
}

impl Credentials {
    /// Read all credential keys from the store
    pub async fn load<S: CredentialStore + ?Sized>(store: &S) -> Result<Self> {
        Ok(Self {
            device_token: store.get(KEY_DEVICE_TOKEN).await?,
            device_id: store.get(KEY_DEVICE_ID).await?,
            tenant_id: store.get(KEY_TENANT_ID).await?,
            owner_id: store.get(KEY_OWNER_ID).await?,
            current_policy: store.get(KEY_CURRENT_POLICY).await?,
        })
    }

    /// Write every present field back to the store in one batch
    ///
    /// Absent fields are left untouched rather than cleared. A token is never
    /// stored without the identity that came with it.
    pub async fn save<S: CredentialStore + ?Sized>(&self, store: &S) -> Result<()> {
        let fields = [
            (KEY_DEVICE_TOKEN, &self.device_token),
            (KEY_DEVICE_ID, &self.device_id),
            (KEY_TENANT_ID, &self.tenant_id),
            (KEY_OWNER_ID, &self.owner_id),
            (KEY_CURRENT_POLICY, &self.current_policy),
        ];
        let entries: Vec<(&str, &str)> = fields
            .iter()
            .filter_map(|(key, value)| value.as_deref().map(|v| (*key, v)))
            .collect();
        store.set_many(&entries).await
    }

    /// A device is enrolled once it holds a token
    pub fn is_enrolled(&self) -> bool {
        self.device_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

// Prevent accidental Debug output of the bearer token
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("device_token", &self.device_token.as_ref().map(|_| "<redacted>"))
            .field("device_id", &self.device_id)
            .field("tenant_id", &self.tenant_id)
            .field("owner_id", &self.owner_id)
            .field("current_policy", &self.current_policy.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrolled_requires_token() {
        let mut creds = Credentials::default();
        assert!(!creds.is_enrolled());

        creds.device_token = Some(String::new());
        assert!(!creds.is_enrolled());

        creds.device_token = Some("tok".into());
        assert!(creds.is_enrolled());
    }

    #[test]
    fn test_debug_redacts_token() {
        let creds = Credentials {
            device_token: Some("secret-token".into()),
            ..Default::default()
        };
        let out = format!("{:?}", creds);
        assert!(out.contains("<redacted>"));
        assert!(!out.contains("secret-token"));
    }
}
