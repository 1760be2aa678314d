//! Event synchronizer: reconciles the provider's auth stream and the
//! startup session probe into the session store.
//!
//! ARCHITECTURE
//! ============
//! Two tasks run per controller:
//! - the event loop drains the provider subscription, commits each session
//!   and spawns a profile fetch for it
//! - the probe task runs once, reading whatever session was persisted
//!
//! Both sources commit through `SessionStore::commit_session`, which bumps
//! the generation. Profile fetches carry the ticket from that commit, so a
//! slow fetch for user A can never land after user B has signed in.
//!
//! OAUTH CALLBACKS
//! ===============
//! When the address carries a callback fragment, the probe first waits for
//! the provider to report that it has consumed it. Providers without such a
//! signal get a fixed settle delay instead. The fragment is stripped after
//! the probe resolves, and once more after the profile attempt if it is
//! somehow still there.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::address::{self, AddressBar};
use crate::error::{AuthError, ErrorCode};
use crate::guard::Ticket;
use crate::provider::{AuthProvider, AuthSubscription, Readiness};
use crate::store::SessionStore;
use crate::types::Session;

pub const DEFAULT_FRAGMENT_SETTLE: Duration = Duration::from_millis(100);
pub const DEFAULT_PROBE_BACKOFF: Duration = Duration::from_millis(250);

/// Tuning for the synchronizer's startup behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upper bound on waiting for the provider to consume a callback
    /// fragment, and the fixed delay used when it cannot tell us.
    pub fragment_settle: Duration,
    /// Total probe attempts. `1` means single-shot.
    pub probe_attempts: u32,
    /// Base delay between probe attempts; grows linearly, plus jitter.
    pub probe_backoff: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { fragment_settle: DEFAULT_FRAGMENT_SETTLE, probe_attempts: 1, probe_backoff: DEFAULT_PROBE_BACKOFF }
    }
}

// =============================================================================
// TASK SET
// =============================================================================

/// Spawned tasks owned by one controller, aborted together on teardown.
#[derive(Default)]
pub(crate) struct TaskSet {
    handles: Mutex<Vec<AbortHandle>>,
}

impl TaskSet {
    pub(crate) fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut).abort_handle();
        if let Ok(mut handles) = self.handles.lock() {
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
    }

    pub(crate) fn abort_all(&self) {
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

// =============================================================================
// SYNCHRONIZER
// =============================================================================

pub struct EventSynchronizer {
    store: Arc<SessionStore>,
    address: Arc<dyn AddressBar>,
    options: SyncOptions,
}

impl EventSynchronizer {
    #[must_use]
    pub fn new(store: Arc<SessionStore>, address: Arc<dyn AddressBar>, options: SyncOptions) -> Self {
        Self { store, address, options }
    }

    /// Register the auth listener, then launch the one-time probe.
    ///
    /// The probe's ticket is taken here, so any auth event delivered while
    /// the probe is waiting or in flight supersedes it.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn start(self, tasks: &Arc<TaskSet>) {
        let subscription = self.store.provider().subscribe();
        let probe_ticket = self.store.guard().ticket(None);
        tasks.spawn(run_events(self.store.clone(), tasks.clone(), subscription));
        tasks.spawn(run_probe(self.store, self.address, self.options, probe_ticket));
    }
}

async fn run_events(store: Arc<SessionStore>, tasks: Arc<TaskSet>, mut subscription: AuthSubscription) {
    while let Some(change) = subscription.recv().await {
        if !store.guard().is_mounted() {
            break;
        }
        match change {
            Ok(event) => {
                let user_id = event.session.as_ref().and_then(Session::user_id).map(str::to_owned);
                debug!(kind = ?event.kind, ?user_id, "auth event");
                let Some(ticket) = store.commit_session(event.session) else {
                    break;
                };
                if ticket.user_id.is_some() {
                    tasks.spawn(load_profile_logged(store.clone(), ticket));
                }
            }
            Err(e) => {
                warn!(error = %e, "unreadable auth event; clearing profile");
                // Cancels profile fetches only; the startup probe stays current.
                store.clear_profile();
            }
        }
    }
    subscription.unsubscribe();
    debug!("auth event loop stopped");
}

async fn run_probe(store: Arc<SessionStore>, address: Arc<dyn AddressBar>, options: SyncOptions, ticket: Ticket) {
    let callback = address::has_auth_fragment(&address.current());
    if callback {
        wait_for_provider(store.provider().as_ref(), options.fragment_settle).await;
    }

    let outcome = probe_session(store.provider().as_ref(), options).await;

    if callback && address::clear_auth_fragment(address.as_ref()) {
        debug!("stripped auth callback fragment");
    }

    match outcome {
        Ok(_) if !store.guard().is_current(&ticket) => {
            debug!("session probe superseded by a newer auth event");
        }
        Ok(session) => {
            if let Some(ticket) = store.commit_session(session) {
                info!(user_id = ?ticket.user_id, "initial session resolved");
                if ticket.user_id.is_some() {
                    load_profile_logged(store.clone(), ticket).await;
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "session probe failed; starting signed out");
            store.fail_closed(&ticket);
        }
    }

    if address::clear_auth_fragment(address.as_ref()) {
        warn!("auth callback fragment still present after startup; stripped");
    }
}

async fn load_profile_logged(store: Arc<SessionStore>, ticket: Ticket) {
    // The store already warned and published a null profile.
    if let Err(e) = store.load_profile(ticket).await {
        debug!(error = %e, "background profile load ended without a profile");
    }
}

async fn wait_for_provider(provider: &dyn AuthProvider, settle: Duration) {
    match tokio::time::timeout(settle, provider.wait_until_ready()).await {
        Ok(Readiness::Ready) => debug!("provider consumed callback fragment"),
        Ok(Readiness::Unsupported) => tokio::time::sleep(settle).await,
        Err(_) => debug!(settle_ms = settle.as_millis(), "provider not ready within settle window"),
    }
}

/// Read the persisted session, retrying transient failures up to the
/// configured attempt count.
async fn probe_session(provider: &dyn AuthProvider, options: SyncOptions) -> Result<Option<Session>, AuthError> {
    let attempts = options.probe_attempts.max(1);
    let mut attempt = 1;
    loop {
        match provider.get_session().await {
            Ok(session) => return Ok(session),
            Err(e) if attempt < attempts && e.retryable() => {
                let delay = backoff_delay(options.probe_backoff, attempt);
                debug!(attempt, error = %e, delay_ms = delay.as_millis(), "session probe failed; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Linear backoff with up to 50% jitter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let scaled = base.saturating_mul(attempt);
    let jitter_cap = u64::try_from(scaled.as_millis() / 2).unwrap_or(u64::MAX);
    let jitter = if jitter_cap == 0 { 0 } else { rand::rng().random_range(0..=jitter_cap) };
    scaled.saturating_add(Duration::from_millis(jitter))
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
