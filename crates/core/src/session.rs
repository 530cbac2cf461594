//! Authenticated session
//!
//! A [`Session`] holds the identity returned by an [`IdentityProvider`] for the
//! lifetime of a login and broadcasts presence transitions to watchers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{Identity, ProviderKind};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticate with the given provider. Cancellation by the user is
    /// reported as an [`Error::Auth`].
    async fn authenticate(&self, provider: ProviderKind) -> Result<Identity>;

    /// End the provider-side login
    async fn sign_out(&self);
}

/// One successful sign-in. Every sign-in gets a fresh serial, so watchers can
/// tell a new login apart from the old one even for the same identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub serial: u64,
    pub identity: Identity,
}

pub struct Session {
    provider: Arc<dyn IdentityProvider>,
    presence: watch::Sender<Option<Login>>,
    next_serial: AtomicU64,
}

impl Session {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (presence, _) = watch::channel(None);
        Self {
            provider,
            presence,
            next_serial: AtomicU64::new(1),
        }
    }

    /// Sign in through the provider. On failure the session is unchanged.
    pub async fn sign_in(&self, provider: ProviderKind) -> Result<Identity> {
        match self.provider.authenticate(provider).await {
            Ok(identity) => {
                info!(provider = %provider, user_id = %identity.id, "Signed in");
                let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
                self.presence.send_replace(Some(Login {
                    serial,
                    identity: identity.clone(),
                }));
                Ok(identity)
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "Sign-in failed");
                Err(match e {
                    auth @ Error::Auth { .. } => auth,
                    other => Error::auth("auth/provider-error", other.to_string()),
                })
            }
        }
    }

    /// Sign out. Watchers see the transition to absent.
    pub async fn sign_out(&self) {
        let Some(identity) = self.current() else {
            return;
        };
        self.provider.sign_out().await;
        self.presence.send_replace(None);
        info!(user_id = %identity.id, "Signed out");
    }

    pub fn current(&self) -> Option<Identity> {
        self.presence.borrow().as_ref().map(|l| l.identity.clone())
    }

    /// The current login, including its serial
    pub fn login(&self) -> Option<Login> {
        self.presence.borrow().clone()
    }

    pub fn is_present(&self) -> bool {
        self.presence.borrow().is_some()
    }

    /// The signed-in identity, or `NotAuthenticated`
    pub fn require(&self) -> Result<Identity> {
        self.current().ok_or(Error::NotAuthenticated)
    }

    /// Watch presence transitions
    pub fn presence(&self) -> watch::Receiver<Option<Login>> {
        self.presence.subscribe()
    }
}
