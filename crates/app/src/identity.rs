//! Identity provider backed by configured account profiles
//!
//! Each provider kind maps to one profile from the config file. Signing in
//! with a provider that has no profile fails the way a refused login would.

use std::collections::HashMap;

use async_trait::async_trait;
use roomchat_core::{Error, Identity, IdentityProvider, ProviderKind, Result};
use tracing::debug;

use crate::config::Account;

pub struct ProfileProvider {
    accounts: HashMap<ProviderKind, Account>,
}

impl ProfileProvider {
    pub fn new(accounts: HashMap<ProviderKind, Account>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl IdentityProvider for ProfileProvider {
    async fn authenticate(&self, provider: ProviderKind) -> Result<Identity> {
        let account = self.accounts.get(&provider).ok_or_else(|| {
            Error::auth(
                "auth/operation-not-allowed",
                format!("{} sign-in is not configured", provider),
            )
        })?;

        if account.id.trim().is_empty() {
            return Err(Error::auth(
                "auth/invalid-profile",
                format!("{} profile has no id", provider),
            ));
        }

        Ok(Identity::new(&account.id, &account.display_name))
    }

    async fn sign_out(&self) {
        debug!("Provider session cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProfileProvider {
        let mut accounts = HashMap::new();
        accounts.insert(
            ProviderKind::Google,
            Account {
                id: "u1".into(),
                display_name: "Ann".into(),
            },
        );
        accounts.insert(
            ProviderKind::Github,
            Account {
                id: " ".into(),
                display_name: "Nobody".into(),
            },
        );
        ProfileProvider::new(accounts)
    }

    #[tokio::test]
    async fn test_configured_profile_signs_in() {
        let identity = provider().authenticate(ProviderKind::Google).await.unwrap();
        assert_eq!(identity, Identity::new("u1", "Ann"));
    }

    #[tokio::test]
    async fn test_blank_profile_is_rejected() {
        let err = provider()
            .authenticate(ProviderKind::Github)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth { code, .. } if code == "auth/invalid-profile"));
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_rejected() {
        let err = ProfileProvider::new(HashMap::new())
            .authenticate(ProviderKind::Google)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth { code, .. } if code == "auth/operation-not-allowed"));
    }
}
