//! Connectivity tracking for a supervised connection.

use std::sync::atomic::{AtomicBool, Ordering};
use tether_core::Signal;

/// Connected flag plus the two signals that turn lifecycle hooks into
/// awaitable events.
///
/// Only the lifecycle hooks write the flag; anyone may read it.
#[derive(Debug, Default)]
pub(crate) struct ConnectionState {
    connected: AtomicBool,
    connect_ok: Signal,
    disconnected: Signal,
}

impl ConnectionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether the most recent lifecycle event was a connect.
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Records a successful connection and raises the connect-ok signal.
    pub(crate) fn mark_established(&self) {
        self.connected.store(true, Ordering::Release);
        self.connect_ok.raise();
    }

    /// Records a lost connection and raises the disconnect signal.
    ///
    /// An unconsumed connect-ok from the connection that just went away is
    /// withdrawn, so a later waiter only wakes for the next connection.
    pub(crate) fn mark_lost(&self) {
        self.connected.store(false, Ordering::Release);
        self.connect_ok.drain();
        self.disconnected.raise();
    }

    pub(crate) fn connect_ok(&self) -> &Signal {
        &self.connect_ok
    }

    pub(crate) fn disconnected(&self) -> &Signal {
        &self.disconnected
    }

    /// Drops pending signals left over from an earlier run.
    pub(crate) fn clear_signals(&self) {
        self.connect_ok.drain();
        self.disconnected.drain();
    }
}
