//! The application's single source of truth for "who is logged in".
//!
//! A [`SessionManager`] is built once at startup around a [`TokenStore`] and
//! shared (usually behind an `Arc`) with everything that needs auth state,
//! including the API client. It holds only the raw token; role and validity
//! are re-derived from it on every query so that an expiry boundary crossed
//! after login is observed immediately.
//!
//! ```text
//! Uninitialized ──initialize──→ Anonymous ⇄ Authenticated(role)
//!                      └──────────────────────↗      (login / logout / 401)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::store::{StorageError, TokenStore};
use super::token::{self, Claims, Role};

/// Coarse auth state as seen by views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionState {
    /// Initial load from storage has not completed yet
    Uninitialized,
    Anonymous,
    /// A valid token is held. `role` is `None` when the token carries no
    /// recognised role claim.
    Authenticated { role: Option<Role> },
}

/// Snapshot of the session as published to subscribers.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<String>,
    ready: bool,
}

impl Session {
    /// Whether the initial load from storage has completed
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Raw token held in memory, valid or not
    pub fn raw_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Claims of the held token if it is valid at `now_secs`
    pub fn claims_at(&self, now_secs: i64) -> Option<Claims> {
        self.token
            .as_deref()
            .and_then(token::decode)
            .filter(|claims| claims.is_live_at(now_secs))
    }

    pub fn is_authenticated_at(&self, now_secs: i64) -> bool {
        self.claims_at(now_secs).is_some()
    }

    pub fn role_at(&self, now_secs: i64) -> Option<Role> {
        self.claims_at(now_secs).and_then(|claims| claims.role)
    }

    pub fn state_at(&self, now_secs: i64) -> SessionState {
        if !self.ready && self.token.is_none() {
            return SessionState::Uninitialized;
        }
        match self.claims_at(now_secs) {
            Some(claims) => SessionState::Authenticated { role: claims.role },
            None => SessionState::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(now_secs())
    }

    pub fn role(&self) -> Option<Role> {
        self.role_at(now_secs())
    }

    pub fn state(&self) -> SessionState {
        self.state_at(now_secs())
    }
}

fn now_secs() -> i64 {
    Utc::now().timestamp()
}

pub struct SessionManager<S> {
    store: S,
    session: watch::Sender<Session>,
    /// Set by the first `initialize` call; later calls return immediately
    init_started: AtomicBool,
    /// Bumped by every in-memory mutation so a slow initial load cannot
    /// overwrite a login or logout that finished first
    generation: AtomicU64,
}

impl<S: TokenStore> SessionManager<S> {
    pub fn new(store: S) -> Self {
        let (session, _) = watch::channel(Session::default());
        Self {
            store,
            session,
            init_started: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the persisted token once.
    ///
    /// A missing, malformed or expired token, or a storage read failure, all
    /// leave the session anonymous. Either way the session is marked ready.
    pub async fn initialize(&self) {
        if self.init_started.swap(true, Ordering::SeqCst) {
            debug!("Session initialization already started");
            return;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let token = match self.store.get().await {
            Ok(Some(stored)) if token::is_valid_token(&stored) => Some(stored),
            Ok(Some(_)) => {
                debug!("Stored token is malformed or expired");
                None
            }
            Ok(None) => {
                debug!("No stored token");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored token, starting anonymous");
                None
            }
        };

        let superseded = self.generation.load(Ordering::SeqCst) != generation;
        self.session.send_modify(|session| {
            if !superseded {
                session.token = token;
            }
            session.ready = true;
        });
        debug!(state = ?self.state(), superseded, "Session initialized");
    }

    /// Persist `token` and adopt it.
    ///
    /// The token is stored as-is; one that does not decode is persisted but
    /// leaves the session anonymous. If the write fails nothing changes in
    /// memory and the error is returned so the caller can offer a retry.
    pub async fn login(&self, token: impl Into<String>) -> Result<(), StorageError> {
        let token = token.into();
        if let Err(e) = self.store.set(token.clone()).await {
            warn!(error = %e, "Failed to persist token, session unchanged");
            return Err(e);
        }

        let claims = token::decode(&token);
        self.replace_token(Some(token));

        match claims {
            Some(claims) => info!(role = ?claims.role, exp = ?claims.exp, "Logged in"),
            None => warn!("Persisted token does not decode, session is anonymous"),
        }
        Ok(())
    }

    /// Forget the session. A failure to delete the stored token is logged
    /// and otherwise ignored; the in-memory session is always cleared.
    pub async fn logout(&self) {
        if let Err(e) = self.store.delete().await {
            warn!(error = %e, "Failed to delete stored token");
        }
        self.replace_token(None);
        info!("Logged out");
    }

    /// Clear the in-memory session without touching storage. Used when the
    /// backend rejects the token.
    pub fn invalidate(&self) {
        if self.session.borrow().token.is_some() {
            info!("Session invalidated");
        }
        self.replace_token(None);
    }

    /// Clear the in-memory session only if it still holds `rejected`.
    ///
    /// A 401 for a request sent with an older token must not wipe a login
    /// that completed while the request was in flight. Returns whether the
    /// session was cleared.
    pub fn invalidate_token(&self, rejected: &str) -> bool {
        let mut cleared = false;
        self.session.send_if_modified(|session| {
            if session.token.as_deref() != Some(rejected) {
                return false;
            }
            session.token = None;
            cleared = true;
            true
        });
        if cleared {
            self.generation.fetch_add(1, Ordering::SeqCst);
            info!("Session invalidated");
        } else {
            debug!("Rejected token is no longer current, session kept");
        }
        cleared
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.borrow().is_authenticated()
    }

    pub fn role(&self) -> Option<Role> {
        self.session.borrow().role()
    }

    pub fn state(&self) -> SessionState {
        self.session.borrow().state()
    }

    pub fn is_ready(&self) -> bool {
        self.session.borrow().is_ready()
    }

    /// Bearer token to attach to requests, only while it is valid
    pub fn token(&self) -> Option<String> {
        let session = self.session.borrow();
        session
            .raw_token()
            .filter(|raw| token::is_valid_token(raw))
            .map(str::to_string)
    }

    /// Claims of the current valid token
    pub fn claims(&self) -> Option<Claims> {
        self.session.borrow().claims_at(now_secs())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims().and_then(|claims| claims.expires_at())
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Session {
        self.session.borrow().clone()
    }

    /// Receiver notified on every session change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    /// Wait until the initial load has completed
    pub async fn wait_ready(&self) {
        let mut rx = self.session.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(Session::is_ready).await;
    }

    fn replace_token(&self, token: Option<String>) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.session.send_modify(|session| session.token = token);
    }
}
