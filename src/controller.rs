//! Session controller: the context object the site builds once at startup.
//!
//! SYSTEM CONTEXT
//! ==============
//! Pages and route guards receive an `Arc<SessionController>` instead of
//! reaching for global state. Dropping the last handle, or calling
//! `shutdown`, unmounts the controller: pending results are discarded, the
//! synchronizer tasks are aborted, and the auth listener is released.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::address::AddressBar;
use crate::error::AuthError;
use crate::provider::{AuthProvider, ProfileStore};
use crate::store::SessionStore;
use crate::sync::{EventSynchronizer, SyncOptions, TaskSet};
use crate::types::{ControllerState, OAuthProvider};

pub struct SessionController {
    store: Arc<SessionStore>,
    tasks: Arc<TaskSet>,
}

impl SessionController {
    /// Build the store and start synchronizing. Must run inside a Tokio runtime.
    #[must_use]
    pub fn start(
        provider: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
        address: Arc<dyn AddressBar>,
        site_url: &str,
        options: SyncOptions,
    ) -> Self {
        let store = Arc::new(SessionStore::new(provider, profiles, site_url));
        let tasks = Arc::new(TaskSet::default());
        EventSynchronizer::new(store.clone(), address, options).start(&tasks);
        Self { store, tasks }
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.store.snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.store.subscribe()
    }

    /// Wait until the first session resolution has finished.
    pub async fn booted(&self) -> ControllerState {
        let mut rx = self.store.subscribe();
        match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.store.snapshot(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// See [`SessionStore::sign_in_with_email`].
    ///
    /// # Errors
    ///
    /// Invalid input or the provider's failure.
    pub async fn sign_in_with_email(&self, email: &str, redirect_path: &str) -> Result<(), AuthError> {
        self.store.sign_in_with_email(email, redirect_path).await
    }

    /// See [`SessionStore::sign_in_with_oauth`].
    ///
    /// # Errors
    ///
    /// Invalid redirect or the provider's failure.
    pub async fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_path: &str) -> Result<String, AuthError> {
        self.store.sign_in_with_oauth(provider, redirect_path).await
    }

    /// See [`SessionStore::sign_out`].
    ///
    /// # Errors
    ///
    /// The provider's failure; local state is cleared regardless.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.store.sign_out().await
    }

    /// See [`SessionStore::refresh_profile`].
    ///
    /// # Errors
    ///
    /// The profile store's failure.
    pub async fn refresh_profile(&self) -> Result<(), AuthError> {
        self.store.refresh_profile().await
    }

    /// Unmount: block further state writes and stop background tasks.
    pub fn shutdown(&self) {
        if self.store.guard().is_mounted() {
            debug!("session controller shutting down");
        }
        self.store.guard().unmount();
        self.tasks.abort_all();
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
