//! Generation guard for discarding superseded async results.
//!
//! DESIGN
//! ======
//! Every session change bumps a monotonically increasing generation. Async
//! work records a `Ticket` when it starts and may only publish if the ticket
//! is still current when it resolves. A separate `mounted` flag blocks all
//! writes once the owning controller has been torn down.
//!
//! Profile fetches additionally carry a profile epoch. Bumping the epoch
//! cancels in-flight profile fetches without superseding the session probe,
//! which only checks the session generation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Snapshot of the guard taken when an async operation starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    /// Profile epoch at issue time; only profile commits check it.
    pub epoch: u64,
    /// User the operation was started for, if any.
    pub user_id: Option<String>,
}

#[derive(Debug)]
pub struct Generation {
    current: AtomicU64,
    epoch: AtomicU64,
    mounted: AtomicBool,
}

impl Generation {
    #[must_use]
    pub fn new() -> Self {
        Self { current: AtomicU64::new(0), epoch: AtomicU64::new(0), mounted: AtomicBool::new(true) }
    }

    /// Supersede all outstanding tickets and issue a fresh one.
    pub fn advance(&self, user_id: Option<&str>) -> Ticket {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket { generation, epoch: self.epoch.load(Ordering::SeqCst), user_id: user_id.map(str::to_owned) }
    }

    /// Issue a ticket for the current generation without superseding anything.
    #[must_use]
    pub fn ticket(&self, user_id: Option<&str>) -> Ticket {
        Ticket {
            generation: self.current.load(Ordering::SeqCst),
            epoch: self.epoch.load(Ordering::SeqCst),
            user_id: user_id.map(str::to_owned),
        }
    }

    /// Cancel in-flight profile fetches. Session tickets stay current.
    pub fn advance_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// True if no newer session change has happened since `ticket` was issued
    /// and the controller is still mounted.
    #[must_use]
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.is_mounted() && self.current.load(Ordering::SeqCst) == ticket.generation
    }

    /// `is_current`, and no profile cancellation since `ticket` was issued.
    #[must_use]
    pub fn is_profile_current(&self, ticket: &Ticket) -> bool {
        self.is_current(ticket) && self.epoch.load(Ordering::SeqCst) == ticket.epoch
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
