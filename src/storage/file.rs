//! File-backed state store.
//!
//! Each key is one JSON file in a directory. Writes go to a temporary file
//! that is renamed over the target, so a crash never leaves a half-written
//! snapshot behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{StateStore, StorageError};

/// State store writing one file per key.
pub struct FileStateStore {
    directory: PathBuf,
    /// Serializes writers so temp files never collide
    write_lock: Mutex<()>,
}

impl FileStateStore {
    /// Open a store rooted at `directory`, creating it if needed.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;

        tracing::info!(directory = %directory.display(), "Opened file state store");

        Ok(Self {
            directory,
            write_lock: Mutex::new(()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.directory.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::trace!(key = %key, bytes = value.len(), "Wrote state file");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileStateStore::open(dir.path()).await.unwrap();
        store.write("message_queue", "[1,2]").await.unwrap();
        drop(store);

        let reopened = FileStateStore::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.read("message_queue").await.unwrap().as_deref(),
            Some("[1,2]")
        );
        assert!(!dir.path().join("message_queue.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path().join("nested")).await.unwrap();

        assert!(store.read("absent").await.unwrap().is_none());
        store.remove("absent").await.unwrap();

        store.write("k", "v").await.unwrap();
        store.remove("k").await.unwrap();
        assert!(store.read("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();
        assert!(matches!(
            store.write("../escape", "x").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
