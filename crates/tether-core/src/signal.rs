//! Single-slot coalescing signal.
//!
//! A [`Signal`] records that *an* event happened, not how many. Raising never
//! blocks and never fails; raising an already pending signal is a no-op.
//! Each successful [`Signal::wait`] or [`Signal::drain`] consumes the pending
//! event, so at most one consumer observes any given raise.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A capacity-one event slot that drops redundant raises.
#[derive(Debug, Default)]
pub struct Signal {
    pending: AtomicBool,
    notify: Notify,
}

impl Signal {
    /// Creates an empty signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the signal as pending and wakes any waiters.
    ///
    /// Returns `false` when an event was already pending and this raise was
    /// coalesced into it.
    pub fn raise(&self) -> bool {
        let fresh = !self.pending.swap(true, Ordering::AcqRel);
        self.notify.notify_waiters();
        fresh
    }

    /// Consumes a pending event without waiting.
    ///
    /// Returns `true` if an event was pending.
    pub fn drain(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Returns whether an event is currently pending.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Waits until an event is pending, then consumes it.
    ///
    /// Cancel safe: dropping the future before it completes consumes nothing.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a raise between the check
            // and the await still wakes us.
            notified.as_mut().enable();

            if self.drain() {
                return;
            }
            notified.await;
        }
    }
}
