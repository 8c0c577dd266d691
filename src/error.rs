//! Error taxonomy for the session manager and its ports.
//!
//! ERROR HANDLING
//! ==============
//! Every failure a caller can observe from `login`/`register` is an
//! [`AuthError`] value, never a panic. [`AuthError::user_message`] yields the
//! text a UI should display; `Display` is the operator-facing form used in
//! logs.

use thiserror::Error;

/// Fallback message when the server rejects a login without explaining why.
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed";
/// Fallback message when the server rejects a registration without explaining why.
pub const REGISTER_FAILED_MESSAGE: &str = "Registration failed";
/// Message shown for transport failures.
pub const NETWORK_FAILED_MESSAGE: &str = "Unable to reach the server";

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Caller-supplied credentials were rejected before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The remote API could not be reached or timed out.
    #[error("network request failed: {0}")]
    Network(String),

    /// The remote API answered with a non-success status.
    #[error("request rejected: status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// A previously trusted token failed verification.
    #[error("session token is no longer valid")]
    TokenInvalid,

    /// The remote API answered 2xx but the body did not match the contract.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A later operation started while this one was in flight; its result was discarded.
    #[error("request superseded by a newer session operation")]
    Superseded,

    /// The token store failed.
    #[error("token store failed: {0}")]
    Storage(#[from] StoreError),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl AuthError {
    /// Text suitable for showing to an end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::Rejected { message: msg, .. } => msg.clone(),
            Self::Network(_) => NETWORK_FAILED_MESSAGE.to_owned(),
            Self::TokenInvalid => "Your session has expired, please sign in again".to_owned(),
            Self::MalformedResponse(_) => "Unexpected response from the server".to_owned(),
            Self::Superseded => "Request was replaced by a newer one".to_owned(),
            Self::Storage(_) => "Could not save the session".to_owned(),
            Self::HttpClientBuild(_) => "Client is misconfigured".to_owned(),
        }
    }

    /// True for a 401 from the remote API or an explicit token rejection.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::TokenInvalid | Self::Rejected { status: 401, .. })
    }
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::Network(_) => "E_NETWORK",
            Self::Rejected { .. } => "E_AUTH_REJECTED",
            Self::TokenInvalid => "E_TOKEN_INVALID",
            Self::MalformedResponse(_) => "E_MALFORMED_RESPONSE",
            Self::Superseded => "E_SUPERSEDED",
            Self::Storage(_) => "E_STORAGE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Superseded | Self::Rejected { status: 429 | 500..=599, .. })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("token store contents are not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("token store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse failed: {key}: {message}")]
    Parse { key: &'static str, message: String },
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
