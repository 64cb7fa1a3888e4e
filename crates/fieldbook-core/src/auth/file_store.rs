use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::{StorageError, TokenStore};

/// Token file name in the data directory
const TOKEN_FILE: &str = "token.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    token: String,
    saved_at: DateTime<Utc>,
}

/// Token store backed by a JSON file, for hosts without a keychain.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    data_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(TOKEN_FILE)
    }

    fn read(path: &Path) -> Result<Option<String>, StorageError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let stored: StoredToken = serde_json::from_str(&contents)?;
        Ok(Some(stored.token))
    }

    fn write(path: &Path, token: String) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored = StoredToken {
            token,
            saved_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&stored)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn remove(path: &Path) -> Result<(), StorageError> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Run a file operation on tokio's blocking pool
    async fn on_blocking_pool<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, StorageError> + Send + 'static,
    {
        let path = self.path();
        tokio::task::spawn_blocking(move || op(&path))
            .await
            .map_err(|e| StorageError::Unavailable(format!("file task failed: {}", e)))?
    }
}

impl TokenStore for FileTokenStore {
    async fn get(&self) -> Result<Option<String>, StorageError> {
        self.on_blocking_pool(Self::read).await
    }

    async fn set(&self, token: String) -> Result<(), StorageError> {
        self.on_blocking_pool(move |path| Self::write(path, token)).await?;
        debug!(path = %self.path().display(), "Token written");
        Ok(())
    }

    async fn delete(&self) -> Result<(), StorageError> {
        self.on_blocking_pool(Self::remove).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "fieldbook-test-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_none() {
        let store = FileTokenStore::new(temp_dir("missing"));
        assert!(store.get().await.expect("read should succeed").is_none());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = temp_dir("round-trip");
        let store = FileTokenStore::new(dir.clone());

        store.set("a.b.c".to_string()).await.expect("write should succeed");
        assert!(store.path().exists());
        assert_eq!(store.get().await.expect("read").as_deref(), Some("a.b.c"));

        store.delete().await.expect("delete should succeed");
        assert!(!store.path().exists());
        assert!(store.get().await.expect("read").is_none());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_file_store_on_single_threaded_runtime() {
        let dir = temp_dir("current-thread");
        let store = FileTokenStore::new(dir.clone());

        let other = FileTokenStore::new(dir.join("elsewhere"));
        let (written, missing) = tokio::join!(
            store.set("x.y.z".to_string()),
            other.get()
        );
        written.expect("write should succeed");
        assert!(missing.expect("read should succeed").is_none());
        assert_eq!(store.get().await.expect("read").as_deref(), Some("x.y.z"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_file_store_delete_missing_is_ok() {
        let store = FileTokenStore::new(temp_dir("delete-missing"));
        assert!(store.delete().await.is_ok());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let dir = temp_dir("corrupt");
        std::fs::create_dir_all(&dir).expect("create dir");
        let store = FileTokenStore::new(dir.clone());
        std::fs::write(store.path(), "not json").expect("write");

        assert!(matches!(store.get().await, Err(StorageError::Corrupt(_))));

        let _ = std::fs::remove_dir_all(dir);
    }
}
