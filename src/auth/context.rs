use super::storage::{MemoryTokenStorage, StoredToken, TokenStorage};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Auth state shared by the transport adapter and the composition root.
///
/// Holds the in-memory token and the persisted backend it falls back to.
pub struct AuthContext {
    token: RwLock<Option<StoredToken>>,
    storage: Arc<dyn TokenStorage>,
}

impl AuthContext {
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            token: RwLock::new(None),
            storage,
        }
    }

    /// Context with nothing persisted beyond the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTokenStorage::new()))
    }

    /// Bearer token for the next request: memory first, then persisted storage
    pub async fn bearer_token(&self) -> Option<String> {
        let now = Utc::now();

        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_usable(now) {
                return Some(token.access_token.clone());
            }
        }

        let stored = match self.storage.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to load persisted token: {}", e);
                return None;
            }
        };

        match stored {
            Some(token) if token.is_usable(now) => {
                debug!("Restored bearer token from persisted storage");
                let access_token = token.access_token.clone();
                *self.token.write().await = Some(token);
                Some(access_token)
            }
            Some(_) => {
                debug!("Persisted token is expired");
                None
            }
            None => None,
        }
    }

    /// Store a token in memory and persist it
    pub async fn sign_in(
        &self,
        access_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let token = StoredToken {
            access_token: access_token.into(),
            expires_at,
        };
        self.storage.store(&token)?;
        *self.token.write().await = Some(token);
        info!("Signed in");
        Ok(())
    }

    /// Drop both the in-memory and the persisted token
    pub async fn clear(&self) -> Result<()> {
        *self.token.write().await = None;
        self.storage.clear()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.bearer_token().await.is_some()
    }
}
