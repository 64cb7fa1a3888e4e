//! Authentication module for managing the client session.
//!
//! This module provides:
//! - `SessionManager`: Observable session state derived from a bearer token
//! - `TokenStore`: The persistence contract, with keychain, file and memory backends
//! - `token`: JWT payload decoding and validity checks
//!
//! The backend issues and verifies tokens; the client only decodes them to
//! learn the role and expiry.

pub mod backend;
pub mod credentials;
pub mod file_store;
pub mod session;
pub mod store;
pub mod token;

pub use backend::{HostTokenStore, TokenBackend};
pub use credentials::KeyringTokenStore;
pub use file_store::FileTokenStore;
pub use session::{Session, SessionManager, SessionState};
pub use store::{MemoryTokenStore, StorageError, TokenStore};
pub use token::{Claims, Role};
