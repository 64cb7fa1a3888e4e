use keyring::Entry;
use tracing::debug;

use super::store::{StorageError, TokenStore};

const SERVICE_NAME: &str = "fieldbook";

/// Keychain entry name under which the bearer token is kept
const DEFAULT_ACCOUNT: &str = "session-token";

/// Token store backed by the OS keychain.
///
/// Keychain calls block, so each one runs on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
    account: String,
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME, DEFAULT_ACCOUNT)
    }
}

impl KeyringTokenStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    async fn with_entry<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T, keyring::Error> + Send + 'static,
    {
        let service = self.service.clone();
        let account = self.account.clone();
        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &account)?;
            op(entry)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("keychain task failed: {}", e)))?
        .map_err(StorageError::from)
    }
}

impl TokenStore for KeyringTokenStore {
    /// Retrieve the token from the OS keychain
    async fn get(&self) -> Result<Option<String>, StorageError> {
        self.with_entry(|entry| match entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    /// Store the token in the OS keychain
    async fn set(&self, token: String) -> Result<(), StorageError> {
        self.with_entry(move |entry| entry.set_password(&token)).await?;
        debug!(service = %self.service, "Token stored in keychain");
        Ok(())
    }

    /// Delete the stored token. A missing entry counts as deleted.
    async fn delete(&self) -> Result<(), StorageError> {
        self.with_entry(|entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }
}
