//! REST adapter for the hosted backend.
//!
//! DESIGN
//! ======
//! The backend exposes GoTrue-style auth endpoints under `/auth/v1` and a
//! PostgREST table API under `/rest/v1`. Every request carries the public
//! `apikey`; requests made on behalf of a member add their bearer token so
//! row-level security applies. Response parsing lives in pure functions so it
//! can be tested without a server.

pub mod auth;
pub mod profiles;

use std::time::Duration;

use reqwest::{Method, RequestBuilder};

use crate::config::{AuthConfig, HttpTimeouts};
use crate::error::AuthError;

pub use auth::RestAuthProvider;
pub use profiles::RestProfileStore;

/// Shared HTTP client and credentials for one backend project.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl BackendClient {
    /// # Errors
    ///
    /// `HttpClientBuild` if the TLS backend cannot be initialized.
    pub fn new(base_url: &str, anon_key: &str, timeouts: HttpTimeouts) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned(), anon_key: anon_key.to_owned() })
    }

    /// # Errors
    ///
    /// See [`BackendClient::new`].
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Self::new(&config.backend_url, &config.anon_key, config.timeouts)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request(&self, method: Method, url: &str, bearer: Option<&str>) -> RequestBuilder {
        let token = bearer.unwrap_or(&self.anon_key);
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {token}"))
    }

    /// Send and return the body of a 2xx response.
    pub(crate) async fn send(builder: RequestBuilder) -> Result<String, AuthError> {
        let response = builder
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(AuthError::Response { status, body });
        }
        Ok(body)
    }
}
