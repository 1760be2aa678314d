//! Seams to the hosted backend: auth provider and profile store.
//!
//! SYSTEM CONTEXT
//! ==============
//! The controller never talks HTTP directly. It consumes these traits so the
//! REST adapter in `rest` and in-memory test doubles are interchangeable.

use tokio::sync::mpsc;

use crate::error::AuthError;
use crate::types::{AuthEvent, OAuthProvider, Profile, Session, SignOutScope};

/// One item on the provider's change stream. `Err` means the provider
/// delivered a payload it could not interpret.
pub type AuthChange = Result<AuthEvent, AuthError>;

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Receiving end of the provider's auth change stream.
///
/// Dropping the subscription unsubscribes; the provider prunes closed
/// listeners on its next emission.
pub struct AuthSubscription {
    rx: mpsc::UnboundedReceiver<AuthChange>,
}

impl AuthSubscription {
    /// Create a linked listener/subscription pair.
    #[must_use]
    pub fn channel() -> (mpsc::UnboundedSender<AuthChange>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next change. `None` once the provider has gone away.
    pub async fn recv(&mut self) -> Option<AuthChange> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.rx.close();
    }
}

/// Whether the provider can tell us it has finished consuming a callback
/// fragment from the address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// No signal available; callers fall back to a fixed settle delay.
    Unsupported,
}

// =============================================================================
// AUTH PROVIDER
// =============================================================================

#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Register for future auth changes.
    fn subscribe(&self) -> AuthSubscription;

    /// Whatever session is currently persisted, if any.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Ask the provider to email a passwordless sign-in link.
    async fn request_email_link(&self, email: &str, redirect_to: &str) -> Result<(), AuthError>;

    /// Start a redirect-based OAuth flow. Returns the URL to navigate to.
    async fn request_oauth_redirect(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String, AuthError>;

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError>;

    /// Resolve once the provider has consumed any callback fragment.
    async fn wait_until_ready(&self) -> Readiness {
        Readiness::Unsupported
    }
}

// =============================================================================
// PROFILE STORE
// =============================================================================

#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Primary-key lookup in the profiles table. `Ok(None)` when no row exists.
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, AuthError>;
}
