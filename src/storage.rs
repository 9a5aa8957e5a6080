//! Persistence of structure state
//!
//! ## Table of Contents
//! - **StateStore**: Trait for key-value storage backends
//! - **MemoryStore**: In-memory store (default)
//! - **FileStore**: JSON file store
//! - **StructurePersistence**: Boundary the block mover saves completed animations through
//! - **StorePersistence**: `StructurePersistence` backed by a `StateStore`

use crate::error::{AnimatorError, Result};
use crate::structure::{Structure, StructureSnapshot};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Trait for state storage backends
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a value
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete a key
    async fn delete(&self, key: &str) -> Result<()>;

    /// List keys with a prefix
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Store name for logging
    fn name(&self) -> &str;
}

/// Get and deserialize JSON from the store
pub async fn store_get_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Serialize and set JSON in the store
pub async fn store_set_json<T: Serialize>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, bytes).await
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self.data.read().await;
        Ok(data.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// JSON file store.
///
/// Every write is flushed, so a crash right after an animation completes
/// does not lose the new structure state.
pub struct FileStore {
    path: PathBuf,
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl FileStore {
    /// Open or create a file store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| AnimatorError::storage(format!("failed to read store: {}", e)))?;
            serde_json::from_str(&contents)?
        } else {
            HashMap::new()
        };

        info!(path = %path.display(), "File store opened");

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, data: &HashMap<String, Vec<u8>>) -> Result<()> {
        let contents = serde_json::to_string_pretty(data)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AnimatorError::storage(format!("failed to create dir: {}", e)))?;
        }

        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| AnimatorError::storage(format!("failed to write store: {}", e)))?;

        debug!(path = %self.path.display(), "File store flushed");
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut data = self.data.write().await;
        data.insert(key.to_string(), value);
        self.flush(&data).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut data = self.data.write().await;
        if data.remove(key).is_some() {
            self.flush(&data).await?;
        }
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self.data.read().await;
        Ok(data.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Type alias for boxed store
pub type BoxedStateStore = Arc<dyn StateStore>;

/// Create a memory store
pub fn memory_store() -> BoxedStateStore {
    Arc::new(MemoryStore::new()) as BoxedStateStore
}

/// Key layout
pub mod keys {
    use crate::types::StructureId;

    /// Structure key prefix
    pub const STRUCTURES: &str = "animator/structures";

    /// Build a structure key
    pub fn structure(id: StructureId) -> String {
        format!("{}/{}", STRUCTURES, id.as_uuid())
    }
}

/// Persistence boundary. Called once per completed animation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StructurePersistence: Send + Sync {
    /// Save the state of a structure after an animation completed
    async fn save_structure_state(&self, snapshot: &StructureSnapshot) -> Result<()>;

    /// Forget a deleted structure
    async fn delete_structure_state(&self, snapshot: &StructureSnapshot) -> Result<()>;
}

/// Type alias for shared persistence
pub type BoxedPersistence = Arc<dyn StructurePersistence>;

/// Persistence that writes JSON snapshots into a [`StateStore`]
#[derive(Clone)]
pub struct StorePersistence {
    store: BoxedStateStore,
}

impl StorePersistence {
    /// Wrap a state store
    pub fn new(store: BoxedStateStore) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &BoxedStateStore {
        &self.store
    }

    /// Load every saved structure. Unreadable entries are skipped.
    pub async fn load_all(&self) -> Result<Vec<Structure>> {
        let mut structures = Vec::new();
        for key in self.store.list_prefix(keys::STRUCTURES).await? {
            match store_get_json::<StructureSnapshot>(self.store.as_ref(), &key).await {
                Ok(Some(snapshot)) => structures.push(snapshot.as_structure().clone()),
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable structure"),
            }
        }
        debug!(store = self.store.name(), count = structures.len(), "Structures loaded");
        Ok(structures)
    }
}

#[async_trait]
impl StructurePersistence for StorePersistence {
    async fn save_structure_state(&self, snapshot: &StructureSnapshot) -> Result<()> {
        store_set_json(self.store.as_ref(), &keys::structure(snapshot.id()), snapshot).await
    }

    async fn delete_structure_state(&self, snapshot: &StructureSnapshot) -> Result<()> {
        self.store.delete(&keys::structure(snapshot.id())).await
    }
}

impl std::fmt::Debug for StorePersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePersistence")
            .field("store", &self.store.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Cuboid;
    use crate::types::ActorId;
    use glam::IVec3;

    fn gate() -> Structure {
        Structure::new(
            "castle gate",
            "portcullis",
            "overworld",
            Cuboid::new(IVec3::new(10, 64, 10), IVec3::new(14, 68, 10)),
            ActorId::new(),
        )
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();

        store.set("key1", b"value1".to_vec()).await.unwrap();
        assert_eq!(store.get("key1").await.unwrap(), Some(b"value1".to_vec()));

        store.delete("key1").await.unwrap();
        assert!(store.get("key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_prefix() {
        let store = MemoryStore::new();

        store.set("prefix/a", b"1".to_vec()).await.unwrap();
        store.set("prefix/b", b"2".to_vec()).await.unwrap();
        store.set("other/c", b"3".to_vec()).await.unwrap();

        let keys = store.list_prefix("prefix/").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"prefix/a".to_string()));
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let persistence = StorePersistence::new(memory_store());
        let structure = gate().with_open(true);
        persistence
            .save_structure_state(&structure.snapshot())
            .await
            .unwrap();

        let loaded = persistence.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, structure.id);
        assert_eq!(loaded[0].cuboid, structure.cuboid);
        assert!(loaded[0].is_open);

        persistence
            .delete_structure_state(&structure.snapshot())
            .await
            .unwrap();
        assert!(persistence.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("structures.json");
        let structure = gate();

        {
            let store = Arc::new(FileStore::open(&path).unwrap());
            let persistence = StorePersistence::new(store);
            persistence
                .save_structure_state(&structure.snapshot())
                .await
                .unwrap();
        }

        let reopened = StorePersistence::new(Arc::new(FileStore::open(&path).unwrap()));
        let loaded = reopened.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "castle gate");
    }

    #[tokio::test]
    async fn test_unreadable_entries_are_skipped() {
        let store = memory_store();
        store
            .set(&format!("{}/garbage", keys::STRUCTURES), b"not json".to_vec())
            .await
            .unwrap();
        let persistence = StorePersistence::new(store);
        assert!(persistence.load_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_key_builder() {
        let id = crate::types::StructureId::new();
        assert_eq!(
            keys::structure(id),
            format!("animator/structures/{}", id.as_uuid())
        );
    }
}
