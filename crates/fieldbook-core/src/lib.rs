//! Core library for fieldbook.
//!
//! The booking backend owns every business rule. What the clients share is
//! the session: which bearer token is held, whether it is still valid, and
//! which role it grants. This crate provides
//!
//! - [`auth`]: the session manager, token decoding and token storage backends
//! - [`api`]: a REST client that attaches the session token and drops the
//!   session when the backend answers 401
//! - [`config`]: on-disk configuration with environment overrides

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError};
pub use auth::{Role, SessionManager, SessionState, StorageError, TokenStore};
pub use config::Config;
