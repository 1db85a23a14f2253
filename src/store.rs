//! Persistent key-value store shared across invocations.
//!
//! Every call is a complete read-modify-write of the backing file. There is no locking:
//! concurrent invocations (including the post-commit hook, which writes the same file)
//! are last-writer-wins.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Raw key-value access to the store
pub trait ConfigStore: Send + Sync {
    /// Read one key. Missing keys return `None`.
    fn load_value(&self, key: &str) -> Result<Option<Value>>;

    /// Write one key, replacing whatever was there
    fn save_value(&self, key: &str, value: Value) -> Result<()>;
}

/// Typed helpers over [`ConfigStore`]
pub trait ConfigStoreExt: ConfigStore {
    /// Load and deserialize a key, falling back to `default` when it is absent
    fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.load_value(key)? {
            Some(Value::Null) | None => Ok(default),
            Some(value) => serde_json::from_value(value)
                .with_context(|| format!("Failed to parse store key '{}'", key)),
        }
    }

    fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .with_context(|| format!("Failed to serialize store key '{}'", key))?;
        self.save_value(key, value)
    }
}

impl<S: ConfigStore + ?Sized> ConfigStoreExt for S {}

/// Store backed by a single JSON object file
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store file {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse store file {}", self.path.display()))
    }

    fn write_all(&self, values: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let contents = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write store file {}", self.path.display()))
    }
}

impl ConfigStore for JsonFileStore {
    fn load_value(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all()?.remove(key))
    }

    fn save_value(&self, key: &str, value: Value) -> Result<()> {
        debug!(key, path = %self.path.display(), "Saving store key");
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value);
        self.write_all(&values)
    }
}

/// In-process store, used by tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently present
    pub fn keys(&self) -> Vec<String> {
        self.values
            .lock()
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ConfigStore for MemoryStore {
    fn load_value(&self, key: &str) -> Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn save_value(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("store.json"));

        let paths: Vec<String> = store.load("paths", Vec::new()).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn test_save_preserves_other_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store.json");
        let store = JsonFileStore::new(&path);

        store.save("last_path_name", &"api").unwrap();
        store.save("count", &3).unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(
            reopened.load::<String>("last_path_name", String::new()).unwrap(),
            "api"
        );
        assert_eq!(reopened.load::<u32>("count", 0).unwrap(), 3);
    }

    #[test]
    fn test_external_writer_is_visible() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        let store = JsonFileStore::new(&path);
        store.save("a", &1).unwrap();

        // Another process rewrites the whole file between our calls
        fs::write(&path, r#"{"a": 5, "b": "x"}"#).unwrap();

        assert_eq!(store.load::<u32>("a", 0).unwrap(), 5);
        assert_eq!(store.load::<String>("b", String::new()).unwrap(), "x");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.load::<u32>("a", 0).is_err());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.save("k", &vec![1, 2, 3]).unwrap();

        assert_eq!(store.load::<Vec<u32>>("k", vec![]).unwrap(), vec![1, 2, 3]);
        assert_eq!(store.keys(), vec!["k".to_string()]);
    }
}
