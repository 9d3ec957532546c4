//! Session identity: the opaque id this client asserts to the relay.
//!
//! The id lives in a small key-value store under [`SESSION_KEY`]. It is
//! generated on first use and reused for as long as the store survives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use pasarela_common::{SessionId, StorageError};
use pasarela_config::SessionConfig;
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Storage key holding the session id.
pub const SESSION_KEY: &str = "pagosSession";

/// Durable string key-value storage.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Load the persisted session id, or generate and persist a new one.
pub fn load_or_create(store: &dyn SessionStore) -> Result<SessionId, StorageError> {
    if let Some(id) = store.get(SESSION_KEY)? {
        let id = id.trim();
        if !id.is_empty() {
            info!(session_id = %id, "loaded persisted session id");
            return Ok(SessionId::from(id));
        }
    }

    let id = SessionId::generate();
    store.set(SESSION_KEY, id.as_str())?;
    info!(session_id = %id, "generated and saved new session id");
    Ok(id)
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// JSON object on disk, one entry per key.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Use the configured path, or `<data dir>/pasarela/session.json`.
    pub fn from_config(config: &SessionConfig) -> Result<Self, StorageError> {
        match &config.storage_path {
            Some(path) => Ok(Self::new(path.clone())),
            None => Ok(Self::new(default_session_path()?)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, e: impl std::fmt::Display) -> StorageError {
        StorageError::Write {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }

    fn read_entries(&self) -> Result<Map<String, Value>, StorageError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(entries)) => Ok(entries),
            _ => {
                warn!(path = %self.path.display(), "session file is unreadable, starting fresh");
                Ok(Map::new())
            }
        }
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .read_entries()?
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), Value::String(value.to_string()));

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }
        let json = serde_json::to_string_pretty(&Value::Object(entries))
            .map_err(|e| self.write_error(e))?;
        std::fs::write(&self.path, json).map_err(|e| self.write_error(e))
    }
}

fn default_session_path() -> Result<PathBuf, StorageError> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| StorageError::PathUnavailable("could not determine data directory".into()))?;
    Ok(data_dir.join("pasarela").join("session.json"))
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
