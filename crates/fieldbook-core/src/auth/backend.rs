use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::credentials::KeyringTokenStore;
use super::file_store::FileTokenStore;
use super::store::{MemoryTokenStore, StorageError, TokenStore};

/// Which host storage keeps the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    #[default]
    Keyring,
    File,
    Memory,
}

impl fmt::Display for TokenBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenBackend::Keyring => "keyring",
            TokenBackend::File => "file",
            TokenBackend::Memory => "memory",
        };
        f.write_str(name)
    }
}

impl FromStr for TokenBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" | "keychain" => Ok(TokenBackend::Keyring),
            "file" => Ok(TokenBackend::File),
            "memory" => Ok(TokenBackend::Memory),
            other => Err(format!("unknown token backend '{}'", other)),
        }
    }
}

/// Token store chosen at startup from configuration.
///
/// The session manager is generic over [`TokenStore`]; this enum is what a
/// host passes in when the backend is only known at runtime.
#[derive(Debug)]
pub enum HostTokenStore {
    Keyring(KeyringTokenStore),
    File(FileTokenStore),
    Memory(MemoryTokenStore),
}

impl HostTokenStore {
    /// `data_dir` is only used by the file backend
    pub fn open(backend: TokenBackend, data_dir: PathBuf) -> Self {
        match backend {
            TokenBackend::Keyring => HostTokenStore::Keyring(KeyringTokenStore::default()),
            TokenBackend::File => HostTokenStore::File(FileTokenStore::new(data_dir)),
            TokenBackend::Memory => HostTokenStore::Memory(MemoryTokenStore::new()),
        }
    }

    pub fn backend(&self) -> TokenBackend {
        match self {
            HostTokenStore::Keyring(_) => TokenBackend::Keyring,
            HostTokenStore::File(_) => TokenBackend::File,
            HostTokenStore::Memory(_) => TokenBackend::Memory,
        }
    }
}

impl TokenStore for HostTokenStore {
    async fn get(&self) -> Result<Option<String>, StorageError> {
        match self {
            HostTokenStore::Keyring(store) => store.get().await,
            HostTokenStore::File(store) => store.get().await,
            HostTokenStore::Memory(store) => store.get().await,
        }
    }

    async fn set(&self, token: String) -> Result<(), StorageError> {
        match self {
            HostTokenStore::Keyring(store) => store.set(token).await,
            HostTokenStore::File(store) => store.set(token).await,
            HostTokenStore::Memory(store) => store.set(token).await,
        }
    }

    async fn delete(&self) -> Result<(), StorageError> {
        match self {
            HostTokenStore::Keyring(store) => store.delete().await,
            HostTokenStore::File(store) => store.delete().await,
            HostTokenStore::Memory(store) => store.delete().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("keyring".parse(), Ok(TokenBackend::Keyring));
        assert_eq!("Keychain".parse(), Ok(TokenBackend::Keyring));
        assert_eq!(" FILE ".parse(), Ok(TokenBackend::File));
        assert_eq!("memory".parse(), Ok(TokenBackend::Memory));
        assert!("sqlite".parse::<TokenBackend>().is_err());
    }

    #[test]
    fn test_backend_serde_names() {
        let json = serde_json::to_string(&TokenBackend::File).expect("serialize");
        assert_eq!(json, "\"file\"");
        let parsed: TokenBackend = serde_json::from_str("\"keyring\"").expect("deserialize");
        assert_eq!(parsed, TokenBackend::Keyring);
    }

    #[tokio::test]
    async fn test_host_store_dispatches_to_memory() {
        let store = HostTokenStore::open(TokenBackend::Memory, PathBuf::from("unused"));
        assert_eq!(store.backend(), TokenBackend::Memory);

        store.set("a.b.c".to_string()).await.expect("set");
        assert_eq!(store.get().await.expect("get").as_deref(), Some("a.b.c"));
        store.delete().await.expect("delete");
        assert!(store.get().await.expect("get").is_none());
    }
}
