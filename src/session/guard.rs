//! Route protection and caller-side credential checks.
//!
//! SYSTEM CONTEXT
//! ==============
//! Views behind a login wall apply identical rules: wait while the session is
//! loading, then either render or send the user to the login page. Form
//! validation lives here rather than in the session manager, which forwards
//! whatever it is given.

#[cfg(test)]
#[path = "guard_test.rs"]
mod guard_test;

use super::state::Session;
use crate::error::AuthError;

/// Decision for an auth-gated route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteAccess {
    /// Session not resolved yet; render nothing gated.
    Pending,
    Allow,
    RedirectToLogin,
}

#[must_use]
pub fn route_access(session: &Session) -> RouteAccess {
    if session.is_loading {
        RouteAccess::Pending
    } else if session.is_authenticated {
        RouteAccess::Allow
    } else {
        RouteAccess::RedirectToLogin
    }
}

/// Reject blank login fields before any network call.
///
/// # Errors
///
/// Returns [`AuthError::Validation`] naming the first blank field.
pub fn validate_login(email: &str, password: &str) -> Result<(), AuthError> {
    require("Email", email)?;
    require("Password", password)
}

/// Reject blank registration fields before any network call.
///
/// # Errors
///
/// Returns [`AuthError::Validation`] naming the first blank field.
pub fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), AuthError> {
    require("Name", name)?;
    validate_login(email, password)
}

fn require(field: &str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("{field} is required")));
    }
    Ok(())
}
