//! In-memory auth provider and profile store for controller tests.
//!
//! Timing is expressed as `tokio::time::sleep` delays so tests running with
//! `start_paused = true` get a deterministic resolution order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::AuthError;
use crate::provider::{AuthChange, AuthProvider, AuthSubscription, ProfileStore, Readiness};
use crate::types::{AuthEvent, OAuthProvider, Profile, Session, SignOutScope};

#[must_use]
pub fn session(user_id: &str) -> Session {
    Session {
        user_id: Some(user_id.to_owned()),
        access_token: Some(format!("token-{user_id}")),
        ..Session::default()
    }
}

#[must_use]
pub fn profile(user_id: &str) -> Profile {
    Profile {
        id: user_id.to_owned(),
        full_name: Some(format!("Member {user_id}")),
        email: Some(format!("{user_id}@fellowship.example")),
        ..Profile::default()
    }
}

// =============================================================================
// MockProvider
// =============================================================================

#[derive(Default)]
pub struct MockProvider {
    listeners: Mutex<Vec<mpsc::UnboundedSender<AuthChange>>>,
    probes: Mutex<VecDeque<(Duration, Result<Option<Session>, AuthError>)>>,
    sign_out_error: Mutex<Option<AuthError>>,
    ready_after: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that signals readiness after `delay`.
    #[must_use]
    pub fn with_ready_signal(delay: Duration) -> Self {
        Self { ready_after: Some(delay), ..Self::default() }
    }

    /// Queue the outcome of the next `get_session` call.
    pub fn push_probe(&self, delay: Duration, result: Result<Option<Session>, AuthError>) {
        self.probes.lock().unwrap().push_back((delay, result));
    }

    pub fn fail_sign_out(&self, err: AuthError) {
        *self.sign_out_error.lock().unwrap() = Some(err);
    }

    /// Deliver a change to every live listener.
    pub fn emit(&self, change: AuthChange) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|tx| {
            let item = match &change {
                Ok(event) => Ok(event.clone()),
                Err(e) => Err(AuthError::MalformedEvent(e.to_string())),
            };
            tx.send(item).is_ok()
        });
    }

    pub fn emit_event(&self, event: AuthEvent) {
        self.emit(Ok(event));
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl AuthProvider for MockProvider {
    fn subscribe(&self) -> AuthSubscription {
        let (tx, sub) = AuthSubscription::channel();
        self.listeners.lock().unwrap().push(tx);
        sub
    }

    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        self.record("get_session".into());
        let next = self.probes.lock().unwrap().pop_front();
        let Some((delay, result)) = next else {
            return Ok(None);
        };
        tokio::time::sleep(delay).await;
        result
    }

    async fn request_email_link(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        self.record(format!("email_link {email} {redirect_to}"));
        Ok(())
    }

    async fn request_oauth_redirect(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String, AuthError> {
        self.record(format!("oauth {provider} {redirect_to}"));
        Ok(format!("https://auth.example/authorize?provider={provider}"))
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError> {
        self.record(format!("sign_out {}", scope.as_str()));
        match self.sign_out_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn wait_until_ready(&self) -> Readiness {
        match self.ready_after {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                Readiness::Ready
            }
            None => Readiness::Unsupported,
        }
    }
}

// =============================================================================
// MockProfiles
// =============================================================================

#[derive(Clone)]
pub enum ProfileReply {
    Found(Profile),
    Missing,
    Fail,
}

#[derive(Default)]
pub struct MockProfiles {
    replies: Mutex<HashMap<String, (Duration, ProfileReply)>>,
    fetches: Mutex<Vec<String>>,
}

impl MockProfiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user_id: &str, delay: Duration, reply: ProfileReply) {
        self.replies.lock().unwrap().insert(user_id.to_owned(), (delay, reply));
    }

    /// Convenience: `user_id` resolves to its standard profile after `delay`.
    pub fn found(&self, user_id: &str, delay: Duration) {
        self.set(user_id, delay, ProfileReply::Found(profile(user_id)));
    }

    #[must_use]
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProfileStore for MockProfiles {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, AuthError> {
        self.fetches.lock().unwrap().push(user_id.to_owned());
        let reply = self.replies.lock().unwrap().get(user_id).cloned();
        let Some((delay, reply)) = reply else {
            return Ok(None);
        };
        tokio::time::sleep(delay).await;
        match reply {
            ProfileReply::Found(p) => Ok(Some(p)),
            ProfileReply::Missing => Ok(None),
            ProfileReply::Fail => Err(AuthError::Response { status: 503, body: "unavailable".into() }),
        }
    }
}

/// Shared mock pair, handy for constructing stores and controllers.
#[must_use]
pub fn mocks() -> (Arc<MockProvider>, Arc<MockProfiles>) {
    (Arc::new(MockProvider::new()), Arc::new(MockProfiles::new()))
}
