//! GoTrue-style auth provider: magic links, OAuth redirects, token refresh,
//! sign-out, and callback fragment handling.
//!
//! SYSTEM CONTEXT
//! ==============
//! Plays the role the provider SDK plays in a browser: it owns the persisted
//! session, emits auth change events to subscribers, and consumes the
//! callback fragment after a redirect. The session controller only sees it
//! through the `AuthProvider` trait.
//!
//! TRADE-OFFS
//! ==========
//! Sign-out clears the stored session even when the logout request fails,
//! matching what the controller does with its own state.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::{Method, Url};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::BackendClient;
use crate::address;
use crate::error::AuthError;
use crate::provider::{AuthChange, AuthProvider, AuthSubscription, Readiness};
use crate::types::{AuthEvent, AuthEventKind, OAuthProvider, Session, SignOutScope};

/// Refresh this many seconds before the access token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 30;

pub struct RestAuthProvider {
    backend: BackendClient,
    session: Mutex<Option<Session>>,
    session_file: Option<PathBuf>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<AuthChange>>>,
    ready: watch::Sender<bool>,
}

impl RestAuthProvider {
    /// Build the provider, restoring any session persisted at `session_file`.
    ///
    /// An unreadable session file is logged and treated as signed out.
    #[must_use]
    pub fn new(backend: BackendClient, session_file: Option<PathBuf>) -> Self {
        let restored = session_file.as_deref().and_then(|path| match load_session_file(path) {
            Ok(session) => session,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable session file");
                None
            }
        });
        let (ready, _) = watch::channel(false);
        Self { backend, session: Mutex::new(restored), session_file, listeners: Mutex::new(Vec::new()), ready }
    }

    /// Current access token, if signed in.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.session
            .lock()
            .ok()
            .and_then(|s| s.as_ref().and_then(|s| s.access_token.clone()))
    }

    /// Complete a magic-link or OAuth callback from the landing address.
    ///
    /// Resolves the user behind the fragment's access token, stores the
    /// session, and emits `SignedIn` (or `PasswordRecovery`). Always marks
    /// the provider ready, even on failure, so waiters are released.
    ///
    /// # Errors
    ///
    /// The provider's error from the fragment, or the user lookup failure.
    pub async fn consume_fragment(&self, address: &str) -> Result<Option<Session>, AuthError> {
        let result = self.consume_fragment_inner(address).await;
        self.ready.send_replace(true);
        result
    }

    async fn consume_fragment_inner(&self, address: &str) -> Result<Option<Session>, AuthError> {
        let Some(fragment) = address::fragment(address) else {
            return Ok(None);
        };
        let callback = parse_callback(fragment)?;
        let Some(callback) = callback else {
            return Ok(None);
        };
        let user = self.fetch_user(&callback.access_token).await?;
        let session = callback.into_session(user, now_secs());
        let kind = if session.raw_claims.get("callback_type").and_then(|v| v.as_str()) == Some("recovery") {
            AuthEventKind::PasswordRecovery
        } else {
            AuthEventKind::SignedIn
        };
        self.store_session(Some(session.clone()));
        info!(user_id = ?session.user_id, "auth callback consumed");
        self.emit(AuthEvent { kind, session: Some(session.clone()) });
        Ok(Some(session))
    }

    /// Exchange the refresh token for a new session and emit `TokenRefreshed`.
    ///
    /// # Errors
    ///
    /// `NotSignedIn` without a refresh token, otherwise the backend failure.
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        let refresh_token = self
            .session
            .lock()
            .ok()
            .and_then(|s| s.as_ref().and_then(|s| s.refresh_token.clone()))
            .ok_or(AuthError::NotSignedIn)?;
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.backend.base_url());
        let builder = self
            .backend
            .request(Method::POST, &url, None)
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        let body = BackendClient::send(builder).await?;
        let session = parse_token_response(&body, now_secs())?;
        self.store_session(Some(session.clone()));
        debug!(user_id = ?session.user_id, "access token refreshed");
        self.emit(AuthEvent { kind: AuthEventKind::TokenRefreshed, session: Some(session.clone()) });
        Ok(session)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<serde_json::Value, AuthError> {
        let url = format!("{}/auth/v1/user", self.backend.base_url());
        let body = BackendClient::send(self.backend.request(Method::GET, &url, Some(access_token))).await?;
        serde_json::from_str(&body).map_err(|e| AuthError::Parse(e.to_string()))
    }

    fn store_session(&self, session: Option<Session>) {
        if let Some(path) = &self.session_file {
            if let Err(e) = save_session_file(path, session.as_ref()) {
                warn!(path = %path.display(), error = %e, "failed to persist session");
            }
        }
        if let Ok(mut slot) = self.session.lock() {
            *slot = session;
        }
    }

    fn emit(&self, event: AuthEvent) {
        let Ok(mut listeners) = self.listeners.lock() else {
            return;
        };
        listeners.retain(|tx| tx.send(Ok(event.clone())).is_ok());
    }
}

#[async_trait::async_trait]
impl AuthProvider for RestAuthProvider {
    fn subscribe(&self) -> AuthSubscription {
        let (tx, subscription) = AuthSubscription::channel();
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(tx);
        }
        subscription
    }

    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let current = self.session.lock().ok().and_then(|s| s.clone());
        let Some(session) = current else {
            return Ok(None);
        };
        if !is_expired(&session, now_secs()) {
            return Ok(Some(session));
        }
        if session.refresh_token.is_none() {
            debug!("stored session expired without refresh token; discarding");
            self.store_session(None);
            return Ok(None);
        }
        match self.refresh().await {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                self.store_session(None);
                Err(e)
            }
        }
    }

    async fn request_email_link(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        let url = otp_url(self.backend.base_url(), redirect_to)?;
        let builder = self
            .backend
            .request(Method::POST, &url, None)
            .json(&serde_json::json!({ "email": email, "create_user": true }));
        BackendClient::send(builder).await?;
        Ok(())
    }

    async fn request_oauth_redirect(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String, AuthError> {
        authorize_url(self.backend.base_url(), provider, redirect_to)
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError> {
        let token = self.access_token();
        let result = match token {
            Some(token) => {
                let url = format!("{}/auth/v1/logout?scope={}", self.backend.base_url(), scope.as_str());
                BackendClient::send(self.backend.request(Method::POST, &url, Some(&token)))
                    .await
                    .map(|_| ())
            }
            None => Ok(()),
        };
        self.store_session(None);
        self.emit(AuthEvent::signed_out());
        result
    }

    async fn wait_until_ready(&self) -> Readiness {
        let mut rx = self.ready.subscribe();
        match rx.wait_for(|ready| *ready).await {
            Ok(_) => Readiness::Ready,
            Err(_) => Readiness::Unsupported,
        }
    }
}

// =============================================================================
// URLS
// =============================================================================

/// `POST /auth/v1/otp?redirect_to=...`
pub(crate) fn otp_url(base_url: &str, redirect_to: &str) -> Result<String, AuthError> {
    let mut url = Url::parse(&format!("{base_url}/auth/v1/otp")).map_err(|e| AuthError::ConfigParse(e.to_string()))?;
    url.query_pairs_mut().append_pair("redirect_to", redirect_to);
    Ok(url.into())
}

/// Provider authorize URL the member's browser is sent to.
pub(crate) fn authorize_url(base_url: &str, provider: OAuthProvider, redirect_to: &str) -> Result<String, AuthError> {
    let mut url =
        Url::parse(&format!("{base_url}/auth/v1/authorize")).map_err(|e| AuthError::ConfigParse(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("provider", provider.as_str())
        .append_pair("redirect_to", redirect_to);
    Ok(url.into())
}

// =============================================================================
// PARSING
// =============================================================================

/// Tokens delivered in a callback fragment.
#[derive(Debug, PartialEq)]
pub(crate) struct Callback {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub expires_in: Option<i64>,
    pub callback_type: Option<String>,
}

impl Callback {
    fn into_session(self, user: serde_json::Value, now: i64) -> Session {
        let user_id = user.get("id").and_then(|v| v.as_str()).map(str::to_owned);
        let mut raw_claims = user;
        if let (Some(kind), Some(obj)) = (&self.callback_type, raw_claims.as_object_mut()) {
            obj.insert("callback_type".into(), serde_json::Value::String(kind.clone()));
        }
        Session {
            user_id,
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token,
            expires_at: self.expires_at.or(self.expires_in.map(|secs| now + secs)),
            raw_claims,
        }
    }
}

/// Read a callback fragment. `Ok(None)` when it carries no token, `Err` when
/// the provider redirected back with an error.
pub(crate) fn parse_callback(fragment: &str) -> Result<Option<Callback>, AuthError> {
    let params = address::parse_fragment_params(fragment);
    if let Some(error) = params.get("error") {
        let description = params.get("error_description").cloned().unwrap_or_else(|| error.clone());
        let status = params
            .get("error_code")
            .and_then(|c| c.parse::<u16>().ok())
            .unwrap_or(400);
        return Err(AuthError::Response { status, body: description });
    }
    let Some(access_token) = params.get("access_token").filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    Ok(Some(Callback {
        access_token: access_token.clone(),
        refresh_token: params.get("refresh_token").cloned(),
        expires_at: params.get("expires_at").and_then(|v| v.parse().ok()),
        expires_in: params.get("expires_in").and_then(|v| v.parse().ok()),
        callback_type: params.get("type").cloned(),
    }))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: serde_json::Value,
}

/// Turn a `/token` response into a session.
pub(crate) fn parse_token_response(body: &str, now: i64) -> Result<Session, AuthError> {
    let token: TokenResponse = serde_json::from_str(body).map_err(|e| AuthError::Parse(e.to_string()))?;
    let user_id = token
        .user
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| AuthError::Parse("token response missing user.id".into()))?;
    Ok(Session {
        user_id: Some(user_id),
        access_token: Some(token.access_token),
        refresh_token: token.refresh_token,
        expires_at: token.expires_at.or(token.expires_in.map(|secs| now + secs)),
        raw_claims: token.user,
    })
}

pub(crate) fn is_expired(session: &Session, now: i64) -> bool {
    session
        .expires_at
        .is_some_and(|at| at - EXPIRY_MARGIN_SECS <= now)
}

// =============================================================================
// PERSISTENCE
// =============================================================================

pub(crate) fn load_session_file(path: &Path) -> Result<Option<Session>, AuthError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AuthError::Storage(e.to_string())),
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&raw).map_err(|e| AuthError::Storage(e.to_string()))
}

pub(crate) fn save_session_file(path: &Path, session: Option<&Session>) -> Result<(), AuthError> {
    match session {
        Some(session) => {
            let raw = serde_json::to_string_pretty(session).map_err(|e| AuthError::Storage(e.to_string()))?;
            std::fs::write(path, raw).map_err(|e| AuthError::Storage(e.to_string()))
        }
        None => match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Storage(e.to_string())),
        },
    }
}

/// Current time as seconds since Unix epoch.
fn now_secs() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_secs()).unwrap_or(0)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
