//! Configuration for a connection manager.

use crate::events::{ReconnectReason, SupervisorEvent};
use std::time::Duration;
use tether_core::{EventListeners, FnListener};

/// Default pause between a failure and the next restart.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
///
/// The reconnect interval is fixed: every disconnect or dial failure waits
/// the same amount of time, and retries never stop on their own.
pub struct SupervisorConfig {
    pub(crate) reconnect_interval: Duration,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<SupervisorEvent>,
}

impl SupervisorConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::new()
    }

    /// Returns the reconnect interval.
    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    /// Returns the instance name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfigBuilder::new().build()
    }
}

impl std::fmt::Debug for SupervisorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorConfig")
            .field("reconnect_interval", &self.reconnect_interval)
            .field("name", &self.name)
            .field("event_listeners", &self.event_listeners.len())
            .finish()
    }
}

/// Builder for [`SupervisorConfig`].
pub struct SupervisorConfigBuilder {
    reconnect_interval: Duration,
    name: String,
    event_listeners: EventListeners<SupervisorEvent>,
}

impl SupervisorConfigBuilder {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        Self {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            name: String::from("<unnamed>"),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the pause between a failure and the next restart.
    ///
    /// Default: 1 second
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets the name used in logs, metric labels, and events.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a listener for every event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&SupervisorEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Registers a callback invoked when a connection is established.
    pub fn on_connected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, SupervisorEvent::Connected { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked when a connection is lost.
    pub fn on_disconnected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, SupervisorEvent::Disconnected { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked with the message of each dial failure.
    pub fn on_dial_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SupervisorEvent::DialFailed { error, .. } = event {
                f(error);
            }
        }));
        self
    }

    /// Registers a callback invoked each time a restart is scheduled.
    pub fn on_reconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(ReconnectReason, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SupervisorEvent::ReconnectScheduled { reason, delay, .. } = event {
                f(*reason, *delay);
            }
        }));
        self
    }

    /// Registers a callback invoked when supervision stops.
    pub fn on_stopped<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, SupervisorEvent::Stopped { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked when a bounded connect wait times out.
    pub fn on_connect_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SupervisorEvent::ConnectTimedOut { timeout, .. } = event {
                f(*timeout);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SupervisorConfig {
        SupervisorConfig {
            reconnect_interval: self.reconnect_interval,
            name: self.name,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for SupervisorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
