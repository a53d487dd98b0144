//! Key-value backends for the persistence store.
//!
//! Values are opaque JSON strings; typing and fallback live in
//! [`crate::store::Storage`].

use crate::error::{PhysioError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Durable string storage addressed by a fixed key.
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value for `key`. `Ok(None)` when nothing was stored.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the value for `key`. Last write wins.
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the key files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PhysioError::Storage(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            PhysioError::Storage(format!(
                "cannot create store dir {}: {e}",
                self.root.display()
            ))
        })?;
        let path = self.path_for(key);
        std::fs::write(&path, value)
            .map_err(|e| PhysioError::Storage(format!("cannot write {}: {e}", path.display())))
    }
}

/// In-process store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| PhysioError::Storage("memory store lock poisoned".to_owned()))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| PhysioError::Storage("memory store lock poisoned".to_owned()))?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
