//! Session storage port
//!
//! The auth context only sees [`SessionStorage`]. Any [`KeyValueStore`] (a
//! browser-local-storage style string map) provides it, with the session laid
//! out under fixed keys.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

use super::session::{StoredSession, User};
use crate::types::{GatehouseError, Result};

/// Fixed storage keys
pub mod keys {
    pub const USER: &str = "gatehouse.auth.user";
    pub const TOKEN: &str = "gatehouse.auth.token";
    pub const REFRESH_TOKEN: &str = "gatehouse.auth.refresh_token";
    pub const EXPIRES_AT: &str = "gatehouse.auth.expires_at";
    pub const OAUTH_STATE: &str = "gatehouse.oauth.state";

    /// Keys that make up a session
    pub const SESSION: [&str; 4] = [USER, TOKEN, REFRESH_TOKEN, EXPIRES_AT];

    /// Record key for a local account
    pub fn account(email: &str) -> String {
        format!("gatehouse.accounts.{}", email)
    }
}

/// Blocking string key-value store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// Read/write/clear of the persisted session
pub trait SessionStorage: Send + Sync {
    fn load_session(&self) -> Result<Option<StoredSession>>;
    fn save_session(&self, session: &StoredSession) -> Result<()>;
    fn clear_session(&self) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> SessionStorage for S {
    fn load_session(&self) -> Result<Option<StoredSession>> {
        let Some(user_json) = self.get(keys::USER)? else {
            return Ok(None);
        };

        let user: User = serde_json::from_str(&user_json)
            .map_err(|e| GatehouseError::Storage(format!("Corrupt stored user: {}", e)))?;

        let token = self.get(keys::TOKEN)?.unwrap_or_default();
        let refresh_token = self.get(keys::REFRESH_TOKEN)?;
        let expires_at = match self.get(keys::EXPIRES_AT)? {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| GatehouseError::Storage(format!("Corrupt stored expiry: {}", e)))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(Some(StoredSession {
            user: user.normalized(),
            token,
            refresh_token,
            expires_at,
        }))
    }

    fn save_session(&self, session: &StoredSession) -> Result<()> {
        let user_json = serde_json::to_string(&session.user)?;

        self.set(keys::TOKEN, &session.token)?;
        match &session.refresh_token {
            Some(refresh) => self.set(keys::REFRESH_TOKEN, refresh)?,
            None => self.remove(keys::REFRESH_TOKEN)?,
        }
        match session.expires_at {
            Some(exp) => self.set(keys::EXPIRES_AT, &exp.to_rfc3339())?,
            None => self.remove(keys::EXPIRES_AT)?,
        }
        // User last: its presence is what marks a session as stored
        self.set(keys::USER, &user_json)
    }

    fn clear_session(&self) -> Result<()> {
        for key in keys::SESSION {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// JSON-file-backed store: one object of string entries, rewritten on change
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                GatehouseError::Storage(format!(
                    "Corrupt store file {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| GatehouseError::Storage("Store lock poisoned".into()))?;

        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Discarding unreadable store {}: {}", self.path.display(), e);
                BTreeMap::new()
            }
        };
        f(&mut entries);
        self.write_entries(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| GatehouseError::Storage("Store lock poisoned".into()))?;
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}
