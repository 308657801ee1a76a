//! Persistence backends for profile and history records
//!
//! Records are JSON documents addressed by a namespace and a name. The
//! stores above this layer own all consistency rules; a backend only has to
//! make each single write durable and all-or-nothing.

use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::sync::RwLock;
use tracing::debug;

/// Keyed record persistence consumed by the profile and history stores
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    /// Create or overwrite a record
    async fn write(&self, namespace: &str, name: &str, content: &str)
    -> Result<(), StorageError>;

    /// Read a record; `Ok(None)` when it does not exist
    async fn read(&self, namespace: &str, name: &str) -> Result<Option<String>, StorageError>;

    /// Remove a record; removing an absent record succeeds
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StorageError>;

    /// Names of every record in a namespace, sorted
    async fn list(&self, namespace: &str) -> Result<Vec<String>, StorageError>;
}

const RECORD_EXTENSION: &str = "json";

/// One JSON file per record under `base_dir/<namespace>/<name>.json`
#[derive(Debug)]
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    /// Create a new file storage instance
    ///
    /// # Error Recovery
    ///
    /// Creates the base directory if it doesn't exist.
    /// Returns an error if directory creation fails.
    pub async fn new(base_dir: &Path) -> Result<Self, StorageError> {
        async_fs::create_dir_all(base_dir)
            .await
            .map_err(|source| StorageError::DirectoryCreationFailed {
                path: base_dir.to_path_buf(),
                source,
            })?;

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.base_dir.join(namespace)
    }

    /// Path of the file holding a record
    pub fn record_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.namespace_dir(namespace)
            .join(format!("{name}.{RECORD_EXTENSION}"))
    }

    /// Write content to a file atomically
    ///
    /// # Error Recovery
    ///
    /// Uses atomic write pattern:
    /// 1. Write to temporary file
    /// 2. Rename temp file to target
    /// 3. Original file is preserved if write fails
    async fn write_atomic(&self, path: &Path, content: &str) -> Result<(), StorageError> {
        debug!(path = ?path, "Writing file atomically");

        let temp_path = path.with_extension("tmp");

        async_fs::write(&temp_path, content)
            .await
            .map_err(|e| StorageError::write_failed(&temp_path, e))?;

        if let Err(e) = async_fs::rename(&temp_path, path).await {
            if let Err(cleanup) = async_fs::remove_file(&temp_path).await {
                debug!(path = ?temp_path, error = %cleanup, "Temp file cleanup failed");
            }
            return Err(StorageError::write_failed(path, e));
        }

        debug!(path = ?path, "File written successfully");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn write(
        &self,
        namespace: &str,
        name: &str,
        content: &str,
    ) -> Result<(), StorageError> {
        let dir = self.namespace_dir(namespace);
        async_fs::create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::DirectoryCreationFailed { path: dir, source })?;

        self.write_atomic(&self.record_path(namespace, name), content)
            .await
    }

    async fn read(&self, namespace: &str, name: &str) -> Result<Option<String>, StorageError> {
        let path = self.record_path(namespace, name);
        debug!(path = ?path, "Reading file");

        match async_fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::read_failed(path, e)),
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StorageError> {
        let path = self.record_path(namespace, name);

        match async_fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(path, e)),
        }
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.namespace_dir(namespace);

        let mut entries = match async_fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StorageError::ListFailed { path: dir, source }),
        };

        let mut names = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => return Err(StorageError::ListFailed { path: dir, source }),
            };
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some(RECORD_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Volatile backend keeping records in memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<BTreeMap<(String, String), String>>,
}

impl MemoryStorage {
    /// Create an empty in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all namespaces
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether no records are stored
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn write(
        &self,
        namespace: &str,
        name: &str,
        content: &str,
    ) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        records.insert(
            (namespace.to_string(), name.to_string()),
            content.to_string(),
        );
        Ok(())
    }

    async fn read(&self, namespace: &str, name: &str) -> Result<Option<String>, StorageError> {
        let records = self.records.read().await;
        Ok(records
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        records.remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let records = self.records.read().await;
        Ok(records
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_storage() -> (FileStorage, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let storage = FileStorage::new(temp_dir.path())
            .await
            .expect("storage should be created");
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn test_storage_creation() {
        let (storage, temp_dir) = create_test_storage().await;
        assert_eq!(storage.base_dir(), temp_dir.path());
    }

    #[tokio::test]
    async fn test_atomic_write_and_read() {
        let (storage, _temp_dir) = create_test_storage().await;

        storage
            .write("profiles", "abc", r#"{"test": "data"}"#)
            .await
            .expect("write should succeed");

        let path = storage.record_path("profiles", "abc");
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let content = storage
            .read("profiles", "abc")
            .await
            .expect("read should succeed");
        assert_eq!(content.as_deref(), Some(r#"{"test": "data"}"#));
    }

    #[tokio::test]
    async fn test_record_path_layout() {
        let (storage, temp_dir) = create_test_storage().await;

        assert_eq!(storage.base_dir(), temp_dir.path());
        assert_eq!(
            storage.record_path("history", "abc_00000000000000000001"),
            temp_dir
                .path()
                .join("history")
                .join("abc_00000000000000000001.json")
        );
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let (storage, _temp_dir) = create_test_storage().await;

        storage
            .write("profiles", "abc", "first")
            .await
            .expect("write should succeed");
        storage
            .write("profiles", "abc", "second")
            .await
            .expect("write should succeed");

        let content = storage
            .read("profiles", "abc")
            .await
            .expect("read should succeed");
        assert_eq!(content.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_read_nonexistent_record() {
        let (storage, _temp_dir) = create_test_storage().await;

        let result = storage
            .read("profiles", "missing")
            .await
            .expect("read should succeed");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_record() {
        let (storage, _temp_dir) = create_test_storage().await;

        storage
            .write("history", "delete_me", "{}")
            .await
            .expect("write should succeed");
        storage
            .delete("history", "delete_me")
            .await
            .expect("delete should succeed");

        assert!(!storage.record_path("history", "delete_me").exists());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_record() {
        let (storage, _temp_dir) = create_test_storage().await;

        let result = storage.delete("history", "nonexistent").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_list_filters_by_extension_and_namespace() {
        let (storage, temp_dir) = create_test_storage().await;

        storage
            .write("profiles", "b", "{}")
            .await
            .expect("write should succeed");
        storage
            .write("profiles", "a", "{}")
            .await
            .expect("write should succeed");
        storage
            .write("history", "c", "{}")
            .await
            .expect("write should succeed");
        async_fs::write(temp_dir.path().join("profiles").join("notes.txt"), "text")
            .await
            .expect("write should succeed");

        let names = storage.list("profiles").await.expect("list should succeed");
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        let empty = storage.list("unknown").await.expect("list should succeed");
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty().await);

        storage
            .write("profiles", "x", "1")
            .await
            .expect("write should succeed");
        storage
            .write("history", "y", "2")
            .await
            .expect("write should succeed");

        assert_eq!(storage.len().await, 2);
        assert_eq!(
            storage.list("profiles").await.expect("list should succeed"),
            vec!["x".to_string()]
        );

        storage
            .delete("profiles", "x")
            .await
            .expect("delete should succeed");
        assert_eq!(
            storage
                .read("profiles", "x")
                .await
                .expect("read should succeed"),
            None
        );
    }
}
