//! Lifecycle hook composition.
//!
//! The manager's own bookkeeping always runs first and the caller's handler
//! second, so a handler that reads `is_connected()` sees the updated state.

use crate::events::SupervisorEvent;
use crate::state::ConnectionState;
use crate::transport::{Connection, ConnectionHook};
use std::sync::Arc;
use std::time::Instant;
use tether_core::EventListeners;

#[cfg(feature = "metrics")]
use metrics::gauge;

#[cfg(feature = "tracing")]
use tracing::{error, info};

/// State shared between the manager, its supervisor loop, and the hooks it
/// installs on the transport.
pub(crate) struct Bookkeeping {
    pub(crate) state: ConnectionState,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<SupervisorEvent>,
}

impl Bookkeeping {
    pub(crate) fn new(name: String, event_listeners: EventListeners<SupervisorEvent>) -> Self {
        Self {
            state: ConnectionState::new(),
            name,
            event_listeners,
        }
    }

    pub(crate) fn emit(&self, event: SupervisorEvent) {
        self.event_listeners.emit(&event);
    }

    fn on_established<C: Connection>(&self, conn: &C) {
        self.state.mark_established();

        #[cfg(feature = "metrics")]
        gauge!("tether_connected", "manager" => self.name.clone()).set(1.0);

        #[cfg(feature = "tracing")]
        info!(
            manager = %self.name,
            local = ?conn.local_addr(),
            remote = ?conn.remote_addr(),
            "connection established"
        );

        self.emit(SupervisorEvent::Connected {
            name: self.name.clone(),
            timestamp: Instant::now(),
            local_addr: conn.local_addr(),
            remote_addr: conn.remote_addr(),
        });
    }

    fn on_lost<C: Connection>(&self, conn: &C) {
        self.state.mark_lost();

        #[cfg(feature = "metrics")]
        gauge!("tether_connected", "manager" => self.name.clone()).set(0.0);

        #[cfg(feature = "tracing")]
        error!(
            manager = %self.name,
            local = ?conn.local_addr(),
            remote = ?conn.remote_addr(),
            "connection lost"
        );

        self.emit(SupervisorEvent::Disconnected {
            name: self.name.clone(),
            timestamp: Instant::now(),
            local_addr: conn.local_addr(),
            remote_addr: conn.remote_addr(),
        });
    }
}

/// Builds the hook installed for connection-established events.
pub(crate) fn established<C: Connection>(
    bookkeeping: Arc<Bookkeeping>,
    handler: Option<ConnectionHook<C>>,
) -> ConnectionHook<C> {
    Arc::new(move |conn: &C| {
        bookkeeping.on_established(conn);
        if let Some(handler) = &handler {
            handler(conn);
        }
    })
}

/// Builds the hook installed for connection-lost events.
pub(crate) fn lost<C: Connection>(
    bookkeeping: Arc<Bookkeeping>,
    handler: Option<ConnectionHook<C>>,
) -> ConnectionHook<C> {
    Arc::new(move |conn: &C| {
        bookkeeping.on_lost(conn);
        if let Some(handler) = &handler {
            handler(conn);
        }
    })
}
