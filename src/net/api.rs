//! Remote auth API port and its `reqwest` implementation.
//!
//! ARCHITECTURE
//! ============
//! [`AuthApi`] is the seam between the session manager and the network. The
//! manager owns the token and passes it in explicitly; [`HttpAuthApi`] turns
//! it into an `Authorization: Bearer` header so callers never touch headers.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures map to [`AuthError::Network`], non-2xx statuses to
//! [`AuthError::Rejected`] (or [`AuthError::TokenInvalid`] for `/auth/me`),
//! and undecodable 2xx bodies to [`AuthError::MalformedResponse`].

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::types::{self, AuthResponse, LoginRequest, RegisterRequest, UserProfile};
use crate::config::{HttpTimeouts, normalize_api_url};
use crate::error::{AuthError, LOGIN_FAILED_MESSAGE, REGISTER_FAILED_MESSAGE};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const ME_PATH: &str = "/auth/me";

/// Operations the session manager needs from the remote auth service.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`.
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError>;

    /// `POST /auth/register`.
    async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResponse, AuthError>;

    /// `GET /auth/me` with the given bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenInvalid`] when the server answers 401 or 403.
    async fn me(&self, token: &str) -> Result<UserProfile, AuthError>;

    /// Arbitrary JSON request against the API, bearer attached when `token` is set.
    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Value, AuthError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpAuthApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: normalize_api_url(base_url) })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        endpoint_url(&self.base_url, path)
    }

    /// Send a request and return `(status, body text)` without interpreting the status.
    async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<(StatusCode, String), AuthError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let mut request = self.http.request(method, self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| AuthError::Network(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| AuthError::Network(e.to_string()))?;
        Ok((status, text))
    }

    async fn credential_call<B>(&self, path: &str, body: &B, fallback: &str) -> Result<AuthResponse, AuthError>
    where
        B: Serialize + Sync,
    {
        let (status, text) = self.execute(Method::POST, path, None, Some(body)).await?;
        if !status.is_success() {
            return Err(rejected(status, &text, fallback));
        }
        types::parse_auth_response(&text)
    }
}

#[async_trait::async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let body = LoginRequest { email, password };
        self.credential_call(LOGIN_PATH, &body, LOGIN_FAILED_MESSAGE).await
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let body = RegisterRequest { name, email, password };
        self.credential_call(REGISTER_PATH, &body, REGISTER_FAILED_MESSAGE).await
    }

    async fn me(&self, token: &str) -> Result<UserProfile, AuthError> {
        let (status, text) = self.execute(Method::GET, ME_PATH, Some(token), None::<&Value>).await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::TokenInvalid);
        }
        if !status.is_success() {
            return Err(rejected(status, &text, "Session check failed"));
        }
        types::parse_me_response(&text)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Value, AuthError> {
        let (status, text) = self.execute(method, path, token, body).await?;
        if !status.is_success() {
            return Err(rejected(status, &text, "Request failed"));
        }
        Ok(parse_json_or_text(&text))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

pub(crate) fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn rejected(status: StatusCode, body: &str, fallback: &str) -> AuthError {
    AuthError::Rejected {
        status: status.as_u16(),
        message: types::server_message(body).unwrap_or_else(|| fallback.to_owned()),
    }
}

/// Decode a 2xx body: JSON when possible, raw text otherwise, `Null` when empty.
pub(crate) fn parse_json_or_text(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;
