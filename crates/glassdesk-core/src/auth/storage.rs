//! Durable key-value storage for the session.
//!
//! Two fixed keys survive restarts: the raw bearer token and the epoch
//! timestamp of the last processed activity. Only the session manager
//! writes them.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKey {
    Token,
    LastActivity,
}

impl StorageKey {
    pub const ALL: [StorageKey; 2] = [StorageKey::Token, StorageKey::LastActivity];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Token => "token",
            StorageKey::LastActivity => "lastActivity",
        }
    }
}

/// Persistence the session manager reads at startup and writes on every
/// login, activity reset and logout.
pub trait SessionStore: Send + 'static {
    fn get(&self, key: StorageKey) -> Result<Option<String>>;

    fn set(&mut self, key: StorageKey, value: &str) -> Result<()>;

    /// Removing a key that is not present is not an error.
    fn remove(&mut self, key: StorageKey) -> Result<()>;
}

impl SessionStore for Box<dyn SessionStore> {
    fn get(&self, key: StorageKey) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: StorageKey, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: StorageKey) -> Result<()> {
        (**self).remove(key)
    }
}

// ============================================================================
// File store
// ============================================================================

/// Stores both keys in `session.json` under the cache directory.
pub struct FileStore {
    cache_dir: PathBuf,
}

impl FileStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }

    fn read_all(path: &Path) -> Result<BTreeMap<String, String>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(path).context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let path = self.path();
        if entries.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path).context("Failed to remove session file")?;
            }
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&path, contents).context("Failed to write session file")?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>> {
        Ok(Self::read_all(&self.path())?.remove(key.as_str()))
    }

    fn set(&mut self, key: StorageKey, value: &str) -> Result<()> {
        // A corrupt file is replaced rather than blocking new writes
        let mut entries = Self::read_all(&self.path()).unwrap_or_default();
        entries.insert(key.as_str().to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&mut self, key: StorageKey) -> Result<()> {
        let mut entries = Self::read_all(&self.path()).unwrap_or_default();
        entries.remove(key.as_str());
        self.write_all(&entries)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store. Clones share the same map, so a caller can keep
/// one clone to inspect what the manager persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<StorageKey, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        let store = Self::default();
        store.lock().insert(StorageKey::Token, token.to_string());
        store
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<StorageKey, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>> {
        Ok(self.lock().get(&key).cloned())
    }

    fn set(&mut self, key: StorageKey, value: &str) -> Result<()> {
        self.lock().insert(key, value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: StorageKey) -> Result<()> {
        self.lock().remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("glassdesk"));

        assert_eq!(store.get(StorageKey::Token).unwrap(), None);

        store.set(StorageKey::Token, "abc.def.ghi").unwrap();
        store.set(StorageKey::LastActivity, "1700000000").unwrap();
        assert_eq!(store.get(StorageKey::Token).unwrap().as_deref(), Some("abc.def.ghi"));
        assert_eq!(
            store.get(StorageKey::LastActivity).unwrap().as_deref(),
            Some("1700000000")
        );

        store.remove(StorageKey::Token).unwrap();
        assert_eq!(store.get(StorageKey::Token).unwrap(), None);
        assert!(store.path().exists());

        store.remove(StorageKey::LastActivity).unwrap();
        assert!(!store.path().exists());

        // Removing again is fine
        store.remove(StorageKey::LastActivity).unwrap();
    }

    #[test]
    fn test_file_store_corrupt_file_is_an_error_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().to_path_buf());
        std::fs::write(store.path(), "not json").unwrap();

        assert!(store.get(StorageKey::Token).is_err());

        // Writes recover by replacing the file
        store.set(StorageKey::Token, "t").unwrap();
        assert_eq!(store.get(StorageKey::Token).unwrap().as_deref(), Some("t"));
    }

    #[test]
    fn test_file_store_uses_fixed_key_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().to_path_buf());
        store.set(StorageKey::LastActivity, "42").unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"lastActivity\""));
    }

    #[test]
    fn test_memory_store_clones_share_entries() {
        let observer = MemoryStore::new();
        let mut writer = observer.clone();

        writer.set(StorageKey::Token, "t").unwrap();
        assert!(!observer.is_empty());
        assert_eq!(observer.get(StorageKey::Token).unwrap().as_deref(), Some("t"));

        writer.remove(StorageKey::Token).unwrap();
        assert!(observer.is_empty());
    }
}
