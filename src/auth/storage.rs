//! Persisted token storage backends

use crate::error::{AppError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

/// Tokens this close to expiry are treated as already gone
const EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Token as it is persisted between sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    /// Usable if it has no expiry or more than the buffer remains
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => now < exp - Duration::minutes(EXPIRY_BUFFER_MINUTES),
            None => true,
        }
    }
}

/// Backend for the persisted copy of the auth state
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Result<Option<StoredToken>>;
    fn store(&self, token: &StoredToken) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Token kept in a JSON file
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<StoredToken>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(token)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local storage, used when no token file is configured
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    token: Mutex<Option<StoredToken>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: StoredToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<StoredToken>>> {
        self.token
            .lock()
            .map_err(|_| AppError::Storage("token mutex poisoned".to_string()))
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<StoredToken>> {
        Ok(self.lock()?.clone())
    }

    fn store(&self, token: &StoredToken) -> Result<()> {
        *self.lock()? = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}
