//! The single authenticated identity of a client process
//!
//! Every screen reads the same [`Session`]; changes are broadcast through a
//! `watch` channel so readers always see the latest identity. The bearer
//! token is persisted through a [`TokenStore`].

use crate::domain::User;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::{info, warn};

/// The signed-in user and the token that proves it
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Bearer token
    pub token: String,
    /// Who the token belongs to
    pub user: User,
}

/// Persistent storage for the bearer token
pub trait TokenStore: Send + Sync {
    /// Previously saved token
    fn load(&self) -> anyhow::Result<Option<String>>;
    /// Persist `token`, replacing any earlier one
    fn save(&self, token: &str) -> anyhow::Result<()>;
    /// Forget the saved token
    fn clear(&self) -> anyhow::Result<()>;
}

/// Token store that lives only as long as the process
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    /// Store pre-loaded with `token`
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> anyhow::Result<Option<String>> {
        let token = self
            .token
            .read()
            .map_err(|_| anyhow::anyhow!("token store lock poisoned"))?;
        Ok(token.clone())
    }

    fn save(&self, token: &str) -> anyhow::Result<()> {
        let mut slot = self
            .token
            .write()
            .map_err(|_| anyhow::anyhow!("token store lock poisoned"))?;
        *slot = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut slot = self
            .token
            .write()
            .map_err(|_| anyhow::anyhow!("token store lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}

/// Shared, observable session
#[derive(Clone)]
pub struct Session {
    tx: Arc<watch::Sender<Option<Identity>>>,
    store: Arc<dyn TokenStore>,
}

impl Session {
    /// Signed-out session persisting through `store`
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            store,
        }
    }

    /// Signed-out session with an in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTokenStore::default()))
    }

    /// Watch identity changes
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    /// Current identity
    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Current user
    pub fn user(&self) -> Option<User> {
        self.tx.borrow().as_ref().map(|i| i.user.clone())
    }

    /// Current bearer token
    pub fn token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|i| i.token.clone())
    }

    /// Token saved by an earlier process, if any
    pub fn persisted_token(&self) -> Option<String> {
        match self.store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read saved token: {}", e);
                None
            }
        }
    }

    /// Sign in as `identity`
    pub fn set(&self, identity: Identity) {
        if let Err(e) = self.store.save(&identity.token) {
            warn!("Failed to persist token: {}", e);
        }
        info!(
            "Session started: user_id={}, role={}",
            identity.user.id, identity.user.role
        );
        self.tx.send_replace(Some(identity));
    }

    /// Replace the user of the current identity, keeping its token
    pub fn refresh_user(&self, user: User) {
        self.tx.send_if_modified(|current| match current {
            Some(identity) if identity.user != user => {
                identity.user = user;
                true
            }
            _ => false,
        });
    }

    /// Sign out and forget the saved token
    pub fn clear(&self) {
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear saved token: {}", e);
        }
        if self.tx.send_replace(None).is_some() {
            info!("Session cleared");
        }
    }
}
