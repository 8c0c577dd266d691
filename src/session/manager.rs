//! Session manager: single source of truth for "is the current user signed in".
//!
//! ARCHITECTURE
//! ============
//! The manager is an explicit context object built once at startup and shared
//! as `Arc<SessionManager>`. It owns the [`Session`] inside a `watch` channel
//! (one writer, many readers), the persisted token via a [`TokenStore`], and
//! the remote API via an [`AuthApi`].
//!
//! CONCURRENCY
//! ===========
//! Each mutating operation takes a ticket from a monotonically increasing
//! sequence before suspending on the network. A result is applied only if its
//! ticket is still the newest when it resolves; otherwise it is discarded and
//! the caller gets [`AuthError::Superseded`]. The check and the state/store
//! write happen together under the channel's write lock, so a stale response
//! can never overwrite a newer one. `logout` advances the sequence too.
//! `login`/`register` wait for startup verification before taking a ticket,
//! so `initialize` is never superseded by a credential call.
//!
//! ERROR HANDLING
//! ==============
//! `initialize` never reports failures: a token that cannot be verified is
//! cleared and the session resolves to anonymous. `login`/`register` return
//! failures as values and record a display message in `last_error`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Method;
use serde_json::Value;
use tokio::sync::{OnceCell, watch};

use super::guard::{self, RouteAccess};
use super::state::{AuthPhase, Session};
use crate::config::CapsuleConfig;
use crate::error::AuthError;
use crate::net::api::{AuthApi, HttpAuthApi};
use crate::net::types::{AuthResponse, UserProfile};
use crate::store::{FileTokenStore, TokenStore};

pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn TokenStore>,
    token_key: String,
    state: watch::Sender<Session>,
    seq: AtomicU64,
    init: OnceCell<()>,
}

impl SessionManager {
    /// Build a manager over the given API and token store; call [`Self::initialize`] next.
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn TokenStore>, token_key: impl Into<String>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self { api, store, token_key: token_key.into(), state, seq: AtomicU64::new(0), init: OnceCell::new() }
    }

    /// Build a manager backed by the HTTP API and the on-disk token file.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: &CapsuleConfig) -> Result<Self, AuthError> {
        let api = HttpAuthApi::new(&config.api_url, config.timeouts)?;
        let store = FileTokenStore::new(&config.token_file);
        Ok(Self::new(Arc::new(api), Arc::new(store), config.token_key.clone()))
    }

    // =========================================================================
    // READERS
    // =========================================================================

    /// Clone of the current session.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver notified on every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// True once startup verification has resolved.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.init.initialized()
    }

    /// Lifecycle phase; `Initializing` until startup verification resolves.
    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        AuthPhase::of(self.is_initialized(), &self.state.borrow())
    }

    /// Route decision for auth-gated views; `Pending` until startup verification resolves.
    #[must_use]
    pub fn route_access(&self) -> RouteAccess {
        if !self.is_initialized() {
            return RouteAccess::Pending;
        }
        guard::route_access(&self.state.borrow())
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Restore the persisted session, verifying its token against `/auth/me`.
    ///
    /// Runs at most once; later and concurrent callers wait for the first run
    /// and get the resulting snapshot.
    pub async fn initialize(&self) -> Session {
        self.ensure_initialized().await;
        self.snapshot()
    }

    async fn ensure_initialized(&self) {
        self.init.get_or_init(|| self.restore()).await;
    }

    async fn restore(&self) {
        let ticket = self.next_ticket();
        let token = match self.store.get(&self.token_key) {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => {
                self.apply(ticket, |session| *session = Session::anonymous());
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "persisted token unreadable; starting anonymous");
                self.apply(ticket, |session| {
                    self.clear_persisted();
                    *session = Session::anonymous();
                });
                return;
            }
        };

        match self.api.me(&token).await {
            Ok(user) => {
                let user_id = user.id.clone();
                if self.apply(ticket, |session| *session = Session::authenticated(token, user)) {
                    tracing::info!(%user_id, "session restored");
                }
            }
            Err(e) => {
                self.apply(ticket, |session| {
                    self.clear_persisted();
                    *session = Session::anonymous();
                });
                tracing::info!(error = %e, "persisted token rejected; cleared");
            }
        }
    }

    // =========================================================================
    // MUTATORS
    // =========================================================================

    /// Sign in with email and password. Inputs are forwarded unvalidated.
    ///
    /// Startup verification always resolves first; a call made before
    /// [`Self::initialize`] runs it.
    ///
    /// # Errors
    ///
    /// Returns the API failure (its `user_message` is also stored in
    /// `last_error`), a storage failure, or [`AuthError::Superseded`] when a
    /// newer operation started before this one resolved.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        self.ensure_initialized().await;
        let ticket = self.begin();
        let result = self.api.login(email, password).await;
        self.finish_credentials(ticket, result, "login")
    }

    /// Create an account and sign in. Same contract as [`Self::login`].
    ///
    /// # Errors
    ///
    /// See [`Self::login`].
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        self.ensure_initialized().await;
        let ticket = self.begin();
        let result = self.api.register(name, email, password).await;
        self.finish_credentials(ticket, result, "register")
    }

    /// Drop the session and the persisted token. Never fails.
    pub fn logout(&self) {
        self.next_ticket();
        self.state.send_modify(|session| {
            self.clear_persisted();
            *session = Session::anonymous();
        });
        tracing::info!("signed out");
    }

    /// Dismiss the last login/register error.
    pub fn clear_error(&self) {
        self.state.send_if_modified(|session| session.last_error.take().is_some());
    }

    /// Call the remote API with the session's bearer token attached.
    ///
    /// A 401 for the token this session still holds signs the user out.
    ///
    /// # Errors
    ///
    /// Returns the API failure unchanged.
    pub async fn authorized_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, AuthError> {
        let token = self.state.borrow().token.clone();
        let result = self.api.send(method, path, token.as_deref(), body).await;
        if let (Err(err), Some(token)) = (&result, token.as_deref()) {
            if err.is_unauthorized() {
                self.expire(token);
            }
        }
        result
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn next_ticket(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn begin(&self) -> u64 {
        let ticket = self.next_ticket();
        self.state.send_modify(|session| {
            session.is_loading = true;
            session.last_error = None;
        });
        ticket
    }

    /// Run `update` under the write lock if `ticket` is still the newest.
    fn apply<F>(&self, ticket: u64, update: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        self.state.send_if_modified(|session| {
            if self.seq.load(Ordering::SeqCst) != ticket {
                return false;
            }
            update(session);
            true
        })
    }

    fn finish_credentials(
        &self,
        ticket: u64,
        result: Result<AuthResponse, AuthError>,
        op: &'static str,
    ) -> Result<UserProfile, AuthError> {
        let mut outcome = Err(AuthError::Superseded);
        let applied = self.apply(ticket, |session| {
            outcome = match result {
                Ok(AuthResponse { token, user }) => match self.store.set(&self.token_key, &token) {
                    Ok(()) => {
                        *session = Session::authenticated(token, user.clone());
                        Ok(user)
                    }
                    Err(e) => Err(AuthError::from(e)),
                },
                Err(e) => Err(e),
            };
            if let Err(err) = &outcome {
                session.is_loading = false;
                session.last_error = Some(err.user_message());
            }
        });

        match &outcome {
            Ok(user) => tracing::info!(op = op, user_id = %user.id, "signed in"),
            Err(e) if applied => tracing::warn!(op = op, error = %e, "authentication failed"),
            Err(_) => tracing::debug!(op = op, "stale authentication result discarded"),
        }
        outcome
    }

    fn expire(&self, rejected: &str) {
        let expired = self.state.send_if_modified(|session| {
            if session.token.as_deref() != Some(rejected) {
                return false;
            }
            self.clear_persisted();
            *session = Session::anonymous();
            true
        });
        if expired {
            tracing::warn!("session token rejected by server; signed out");
        }
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.store.remove(&self.token_key) {
            tracing::warn!(error = %e, "failed to clear persisted token");
        }
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
