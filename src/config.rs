//! Client configuration parsed from environment variables.

use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api";
pub const DEFAULT_TOKEN_FILE: &str = ".capsule/session.json";
pub const DEFAULT_TOKEN_KEY: &str = "token";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsuleConfig {
    /// Base URL of the remote auth API, without trailing slash.
    pub api_url: String,
    /// JSON file backing the persistent token store.
    pub token_file: PathBuf,
    /// Key under which the bearer token is persisted.
    pub token_key: String,
    pub timeouts: HttpTimeouts,
}

impl Default for CapsuleConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
            token_key: DEFAULT_TOKEN_KEY.to_owned(),
            timeouts: HttpTimeouts::default(),
        }
    }
}

impl CapsuleConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `CAPSULE_API_URL`: default `http://127.0.0.1:5000/api`
    /// - `CAPSULE_TOKEN_FILE`: default `.capsule/session.json`
    /// - `CAPSULE_TOKEN_KEY`: default `token`
    /// - `CAPSULE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `CAPSULE_CONNECT_TIMEOUT_SECS`: default 10
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (environment, test map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = normalize_api_url(&lookup("CAPSULE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_owned()));
        let token_file = lookup("CAPSULE_TOKEN_FILE").map_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE), PathBuf::from);
        let token_key = match lookup("CAPSULE_TOKEN_KEY") {
            Some(key) if key.trim().is_empty() => {
                return Err(ConfigError::Parse { key: "CAPSULE_TOKEN_KEY", message: "must not be empty".into() });
            }
            Some(key) => key,
            None => DEFAULT_TOKEN_KEY.to_owned(),
        };
        let timeouts = HttpTimeouts {
            request_secs: parse_secs(&lookup, "CAPSULE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: parse_secs(&lookup, "CAPSULE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };

        Ok(Self { api_url, token_file, token_key, timeouts })
    }
}

pub(crate) fn normalize_api_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

fn parse_secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Parse { key, message: "must be greater than zero".into() }),
        Ok(secs) => Ok(secs),
        Err(e) => Err(ConfigError::Parse { key, message: e.to_string() }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
