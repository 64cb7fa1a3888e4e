//! REST API client module for the booking backend.
//!
//! This module provides the `ApiClient` for talking to the backend that owns
//! fields, availability and reservations. Requests carry the session's JWT
//! as a bearer credential; the backend is the only party that verifies it.

pub mod client;
pub mod error;

pub use client::{ApiClient, UserProfile, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
