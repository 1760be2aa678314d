//! Backend and controller configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AuthError;
use crate::sync::SyncOptions;

pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";
pub const DEFAULT_PROFILES_TABLE: &str = "profiles";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FRAGMENT_SETTLE_MS: u64 = 100;
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 1;
pub const DEFAULT_PROBE_BACKOFF_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Base URL of the hosted backend, without trailing slash.
    pub backend_url: String,
    /// Public (anon) API key sent as `apikey` on every request.
    pub anon_key: String,
    /// Public site origin that sign-in links redirect back to.
    pub site_url: String,
    pub profiles_table: String,
    /// Where the current session is persisted between runs, if anywhere.
    pub session_file: Option<PathBuf>,
    pub timeouts: HttpTimeouts,
    pub sync: SyncOptions,
}

impl AuthConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `BACKEND_URL`
    /// - `BACKEND_ANON_KEY`
    ///
    /// Optional:
    /// - `SITE_URL`: default `http://localhost:3000`
    /// - `PROFILES_TABLE`: default `profiles`
    /// - `AUTH_SESSION_FILE`: persist the session as JSON at this path
    /// - `AUTH_REQUEST_TIMEOUT_SECS`: default 30
    /// - `AUTH_CONNECT_TIMEOUT_SECS`: default 10
    /// - `AUTH_FRAGMENT_SETTLE_MS`: default 100
    /// - `AUTH_PROBE_ATTEMPTS`: default 1 (single-shot)
    /// - `AUTH_PROBE_BACKOFF_MS`: default 250
    ///
    /// # Errors
    ///
    /// `MissingConfig` for an absent required variable, `ConfigParse` for a
    /// malformed URL or a zero attempt count.
    pub fn from_env() -> Result<Self, AuthError> {
        let backend_url = required_url("BACKEND_URL")?;
        let anon_key = std::env::var("BACKEND_ANON_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AuthError::MissingConfig { var: "BACKEND_ANON_KEY".into() })?;
        let site_url = parse_url(
            "SITE_URL",
            &std::env::var("SITE_URL").unwrap_or_else(|_| DEFAULT_SITE_URL.to_string()),
        )?;
        let profiles_table = std::env::var("PROFILES_TABLE").unwrap_or_else(|_| DEFAULT_PROFILES_TABLE.to_string());
        let session_file = std::env::var("AUTH_SESSION_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let timeouts = HttpTimeouts {
            request_secs: env_parse("AUTH_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("AUTH_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        let probe_attempts = env_parse("AUTH_PROBE_ATTEMPTS", DEFAULT_PROBE_ATTEMPTS);
        if probe_attempts == 0 {
            return Err(AuthError::ConfigParse("AUTH_PROBE_ATTEMPTS must be at least 1".into()));
        }
        let sync = SyncOptions {
            fragment_settle: Duration::from_millis(env_parse("AUTH_FRAGMENT_SETTLE_MS", DEFAULT_FRAGMENT_SETTLE_MS)),
            probe_attempts,
            probe_backoff: Duration::from_millis(env_parse("AUTH_PROBE_BACKOFF_MS", DEFAULT_PROBE_BACKOFF_MS)),
        };

        Ok(Self { backend_url, anon_key, site_url, profiles_table, session_file, timeouts, sync })
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn required_url(key: &str) -> Result<String, AuthError> {
    let raw = std::env::var(key).map_err(|_| AuthError::MissingConfig { var: key.into() })?;
    parse_url(key, &raw)
}

fn parse_url(key: &str, raw: &str) -> Result<String, AuthError> {
    let trimmed = raw.trim().trim_end_matches('/');
    match reqwest::Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(trimmed.to_string()),
        _ => Err(AuthError::ConfigParse(format!("{key} is not an http(s) URL: {raw}"))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
