//! Session store: the authoritative holder of `ControllerState`.
//!
//! DESIGN
//! ======
//! State lives in a `watch` channel so downstream consumers read it
//! reactively. Every write goes through `send_if_modified`, and the
//! generation check for guarded writes runs inside that closure, so the
//! check and the write cannot be split by another writer.
//!
//! ERROR HANDLING
//! ==============
//! Network-calling operations log failures and hand the caller a `Result`.
//! The store has no "errored" state: failures end up as a null session or
//! a null profile.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::guard::{Generation, Ticket};
use crate::provider::{AuthProvider, ProfileStore};
use crate::types::{ControllerState, OAuthProvider, Profile, Session, SignOutScope};

pub struct SessionStore {
    state: watch::Sender<ControllerState>,
    guard: Generation,
    provider: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileStore>,
    site_url: String,
}

impl SessionStore {
    #[must_use]
    pub fn new(provider: Arc<dyn AuthProvider>, profiles: Arc<dyn ProfileStore>, site_url: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ControllerState::default());
        Self {
            state,
            guard: Generation::new(),
            provider,
            profiles,
            site_url: site_url.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Current state, cloned.
    #[must_use]
    pub fn snapshot(&self) -> ControllerState {
        self.state.borrow().clone()
    }

    /// Reactive view of the state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    pub(crate) fn guard(&self) -> &Generation {
        &self.guard
    }

    pub(crate) fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    // =========================================================================
    // PUBLIC OPERATIONS
    // =========================================================================

    /// Ask the provider to email a sign-in link that lands on `redirect_path`.
    ///
    /// Does not touch state; the session arrives later as an auth event.
    ///
    /// # Errors
    ///
    /// `InvalidEmail`/`InvalidRedirect` for bad input, otherwise the
    /// provider's failure.
    pub async fn sign_in_with_email(&self, email: &str, redirect_path: &str) -> Result<(), AuthError> {
        let email = normalize_email(email).ok_or(AuthError::InvalidEmail)?;
        let redirect_to = redirect_url(&self.site_url, redirect_path)?;
        match self.provider.request_email_link(&email, &redirect_to).await {
            Ok(()) => {
                info!(%redirect_to, "sign-in link requested");
                Ok(())
            }
            Err(e) => {
                log_operation_error("sign_in_with_email", &e);
                Err(e)
            }
        }
    }

    /// Start an OAuth redirect flow. Returns the provider URL to navigate to.
    ///
    /// # Errors
    ///
    /// `InvalidRedirect` for a bad path, otherwise the provider's failure.
    pub async fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_path: &str) -> Result<String, AuthError> {
        let redirect_to = redirect_url(&self.site_url, redirect_path)?;
        self.provider
            .request_oauth_redirect(provider, &redirect_to)
            .await
            .inspect_err(|e| log_operation_error("sign_in_with_oauth", e))
    }

    /// Sign out this device only.
    ///
    /// Local state is cleared whether or not the provider call succeeds; a
    /// remote failure is still returned so the caller can surface it. The
    /// provider is skipped only once booted with no session; during boot it
    /// may still hold a persisted session the probe has not returned.
    ///
    /// # Errors
    ///
    /// The provider's sign-out failure, after local state has been cleared.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let known_signed_out = {
            let state = self.state.borrow();
            !state.loading && state.session.is_none()
        };
        if known_signed_out {
            self.clear_local();
            return Ok(());
        }
        let result = self.provider.sign_out(SignOutScope::Local).await;
        if let Err(e) = &result {
            warn!(error = %e, "remote sign-out failed; clearing local session anyway");
        }
        self.clear_local();
        info!("signed out");
        result
    }

    /// Re-fetch the profile for the current user. No-op when signed out.
    ///
    /// # Errors
    ///
    /// The profile store's failure; the profile is cleared in that case.
    pub async fn refresh_profile(&self) -> Result<(), AuthError> {
        let Some(user_id) = self.snapshot().user_id().map(str::to_owned) else {
            return Ok(());
        };
        let ticket = self.guard.ticket(Some(&user_id));
        self.load_profile(ticket).await
    }

    // =========================================================================
    // GUARDED WRITES
    // =========================================================================

    /// Record a new session and supersede all in-flight work.
    ///
    /// Clears the profile when it belongs to a different user. A session
    /// without a user resolves immediately and ends the boot phase. Returns
    /// `None` once unmounted.
    pub(crate) fn commit_session(&self, session: Option<Session>) -> Option<Ticket> {
        if !self.guard.is_mounted() {
            return None;
        }
        let mut ticket = None;
        self.state.send_if_modified(|state| {
            let user_id = session.as_ref().and_then(Session::user_id).map(str::to_owned);
            ticket = Some(self.guard.advance(user_id.as_deref()));
            let before = state.clone();
            let profile_matches = state
                .profile
                .as_ref()
                .is_some_and(|p| Some(p.id.as_str()) == user_id.as_deref());
            if !profile_matches {
                state.profile = None;
            }
            state.session = session;
            if user_id.is_none() {
                state.loading = false;
            }
            *state != before
        });
        ticket
    }

    /// Publish a fetched profile if `ticket` is still current. Ends the boot phase.
    pub(crate) fn commit_profile(&self, ticket: &Ticket, profile: Option<Profile>) -> bool {
        let mut written = false;
        self.state.send_if_modified(|state| {
            if !self.guard.is_profile_current(ticket) {
                return false;
            }
            written = true;
            let before = (state.profile.clone(), state.loading);
            state.profile = profile;
            state.loading = false;
            (state.profile.clone(), state.loading) != before
        });
        if !written {
            debug!(generation = ticket.generation, user_id = ?ticket.user_id, "discarding stale profile result");
        }
        written
    }

    /// Fail closed after a probe error, unless something newer already resolved.
    pub(crate) fn fail_closed(&self, ticket: &Ticket) -> bool {
        let mut written = false;
        self.state.send_if_modified(|state| {
            if !self.guard.is_current(ticket) {
                return false;
            }
            written = true;
            let next = ControllerState { session: None, profile: None, loading: false };
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        written
    }

    /// Drop the profile and cancel in-flight profile fetches; the session
    /// and any pending session probe are untouched.
    ///
    /// A cancelled fetch can no longer end the boot phase, so a committed
    /// session resolves here with no profile. Before any session has been
    /// committed, booting is left to the probe.
    pub(crate) fn clear_profile(&self) {
        if !self.guard.is_mounted() {
            return;
        }
        self.state.send_if_modified(|state| {
            self.guard.advance_epoch();
            let had_profile = state.profile.take().is_some();
            let resolves_boot = state.loading && state.session.is_some();
            if resolves_boot {
                state.loading = false;
            }
            had_profile || resolves_boot
        });
    }

    fn clear_local(&self) {
        if !self.guard.is_mounted() {
            return;
        }
        self.state.send_if_modified(|state| {
            self.guard.advance(None);
            let next = ControllerState { session: None, profile: None, loading: false };
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Fetch the profile for `ticket`'s user and publish it if still current.
    ///
    /// A failed fetch publishes `None` so the session stays but the profile
    /// is unknown.
    pub(crate) async fn load_profile(&self, ticket: Ticket) -> Result<(), AuthError> {
        let Some(user_id) = ticket.user_id.as_deref() else {
            self.commit_profile(&ticket, None);
            return Ok(());
        };
        match self.profiles.fetch_profile(user_id).await {
            Ok(Some(profile)) if profile.id != user_id => {
                warn!(user_id, profile_id = %profile.id, "profile store returned a different user; ignoring");
                self.commit_profile(&ticket, None);
                Ok(())
            }
            Ok(profile) => {
                if profile.is_none() {
                    debug!(user_id, "no profile row");
                }
                self.commit_profile(&ticket, profile);
                Ok(())
            }
            Err(e) => {
                warn!(user_id, error = %e, "profile fetch failed");
                self.commit_profile(&ticket, None);
                Err(e)
            }
        }
    }
}

// =============================================================================
// INPUT HELPERS
// =============================================================================

/// Trim and lowercase an email address; `None` if it is not plausibly valid.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || normalized.contains(char::is_whitespace) {
        return None;
    }
    Some(normalized)
}

/// Join a site-relative `path` onto `site_url`.
///
/// # Errors
///
/// `InvalidRedirect` unless `path` is a single-slash absolute path, so sign-in
/// links can never bounce members to another host.
pub fn redirect_url(site_url: &str, path: &str) -> Result<String, AuthError> {
    let path = path.trim();
    if !path.starts_with('/') || path.starts_with("//") || path.contains('\\') {
        return Err(AuthError::InvalidRedirect(path.to_owned()));
    }
    Ok(format!("{}{path}", site_url.trim_end_matches('/')))
}

fn log_operation_error(operation: &str, e: &AuthError) {
    if e.is_user_error() {
        debug!(operation, error = %e, "rejected input");
    } else {
        warn!(operation, error = %e, "auth operation failed");
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
