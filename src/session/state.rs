//! Session snapshot handed to readers.
//!
//! SYSTEM CONTEXT
//! ==============
//! Route guards and user-aware views read a cloned [`Session`]; only the
//! session manager constructs or mutates one.

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;

use crate::net::types::UserProfile;

/// Coarse lifecycle phase derived from a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthPhase {
    Initializing,
    Anonymous,
    Authenticated,
}

impl AuthPhase {
    /// Phase of `session` given whether startup verification has resolved.
    #[must_use]
    pub fn of(initialized: bool, session: &Session) -> Self {
        if session.is_authenticated && session.token.is_some() && session.user.is_some() {
            Self::Authenticated
        } else if initialized {
            Self::Anonymous
        } else {
            Self::Initializing
        }
    }
}

/// Authentication state for the running client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    /// Message from the most recent failed login/register, if any.
    pub last_error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self { token: None, user: None, is_authenticated: false, is_loading: true, last_error: None }
    }
}

impl Session {
    /// Resolved, signed-out session.
    #[must_use]
    pub fn anonymous() -> Self {
        Self { is_loading: false, ..Self::default() }
    }

    /// Resolved session backed by an accepted token.
    #[must_use]
    pub fn authenticated(token: String, user: UserProfile) -> Self {
        Self { token: Some(token), user: Some(user), is_authenticated: true, is_loading: false, last_error: None }
    }
}
