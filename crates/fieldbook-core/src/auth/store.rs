//! Persisted storage of the bearer token.
//!
//! The session manager only knows this three-operation contract. Which host
//! storage sits behind it (OS keychain, a file in the data directory, process
//! memory) is decided once at startup.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt token file: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable home of a single token string.
///
/// `get` returns `Ok(None)` when nothing is stored. `delete` on an empty store
/// succeeds.
pub trait TokenStore: Send + Sync + 'static {
    fn get(&self) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    fn set(&self, token: String) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn delete(&self) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Process-local store. Nothing survives a restart.
///
/// Failures can be switched on per operation, which is how the session
/// scenarios around unavailable storage are exercised.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    fail_delete: AtomicBool,
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::default();
        *store.slot() = Some(token.into());
        store
    }

    /// Current stored value, bypassing failure injection and counters
    pub fn peek(&self) -> Option<String> {
        self.slot().clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Number of (get, set, delete) calls made so far
    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.gets.load(Ordering::SeqCst),
            self.sets.load(Ordering::SeqCst),
            self.deletes.load(Ordering::SeqCst),
        )
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    async fn get(&self) -> Result<Option<String>, StorageError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("read failed".to_string()));
        }
        Ok(self.slot().clone())
    }

    async fn set(&self, token: String) -> Result<(), StorageError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("write failed".to_string()));
        }
        *self.slot() = Some(token);
        Ok(())
    }

    async fn delete(&self) -> Result<(), StorageError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("delete failed".to_string()));
        }
        *self.slot() = None;
        Ok(())
    }
}
