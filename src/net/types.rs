//! Wire DTOs for the remote auth API.
//!
//! DESIGN
//! ======
//! Request bodies borrow from the caller so credentials are never cloned.
//! Response parsing is pure and lives here so the HTTP client stays a thin
//! transport wrapper.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuthError;

/// Profile of the signed-in user as returned by the auth API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Unique user identifier. Document-store backends send `_id`.
    #[serde(alias = "_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Sign-in email address.
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Successful `POST /auth/login` or `POST /auth/register` body.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// `GET /auth/me` body: either `{ "user": {...} }` or the bare profile.
#[derive(Deserialize)]
#[serde(untagged)]
enum MeResponse {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a successful login/register body.
pub fn parse_auth_response(json: &str) -> Result<AuthResponse, AuthError> {
    let resp: AuthResponse = serde_json::from_str(json).map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
    if resp.token.is_empty() {
        return Err(AuthError::MalformedResponse("empty token".into()));
    }
    Ok(resp)
}

/// Parse a successful `/auth/me` body.
pub fn parse_me_response(json: &str) -> Result<UserProfile, AuthError> {
    let resp: MeResponse = serde_json::from_str(json).map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
    Ok(match resp {
        MeResponse::Wrapped { user } | MeResponse::Bare(user) => user,
    })
}

/// Extract the human-readable message from an error body.
///
/// Looks at `msg`, `message`, `error`, then the first `errors[].msg`. Fields
/// of an unexpected shape are skipped rather than failing the whole body.
/// Returns `None` for non-JSON bodies or when every candidate is blank.
pub fn server_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let direct = ["msg", "message", "error"].into_iter().filter_map(|key| parsed.get(key).and_then(Value::as_str));
    let nested = parsed
        .get("errors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("msg").and_then(Value::as_str));
    direct.chain(nested).map(str::trim).find(|m| !m.is_empty()).map(str::to_owned)
}
