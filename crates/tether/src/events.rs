//! Events emitted by a [`ConnectionManager`](crate::ConnectionManager).

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tether_core::LifecycleEvent;

/// What prompted a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectReason {
    /// An established connection went away.
    Disconnect,
    /// A dial attempt failed.
    DialError,
}

impl ReconnectReason {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconnectReason::Disconnect => "disconnect",
            ReconnectReason::DialError => "dial_error",
        }
    }
}

impl fmt::Display for ReconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle events of a supervised connection.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// The transport reported an established connection.
    Connected {
        name: String,
        timestamp: Instant,
        local_addr: Option<SocketAddr>,
        remote_addr: Option<SocketAddr>,
    },
    /// The transport reported a lost connection.
    Disconnected {
        name: String,
        timestamp: Instant,
        local_addr: Option<SocketAddr>,
        remote_addr: Option<SocketAddr>,
    },
    /// A dial attempt failed.
    DialFailed {
        name: String,
        timestamp: Instant,
        error: String,
    },
    /// The supervisor is backing off before restarting the transport.
    ReconnectScheduled {
        name: String,
        timestamp: Instant,
        reason: ReconnectReason,
        delay: Duration,
    },
    /// Supervision ended because its scope was cancelled.
    Stopped { name: String, timestamp: Instant },
    /// A bounded connect wait gave up.
    ConnectTimedOut {
        name: String,
        timestamp: Instant,
        timeout: Duration,
    },
}

impl LifecycleEvent for SupervisorEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupervisorEvent::Connected { .. } => "connected",
            SupervisorEvent::Disconnected { .. } => "disconnected",
            SupervisorEvent::DialFailed { .. } => "dial_failed",
            SupervisorEvent::ReconnectScheduled { .. } => "reconnect_scheduled",
            SupervisorEvent::Stopped { .. } => "stopped",
            SupervisorEvent::ConnectTimedOut { .. } => "connect_timed_out",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            SupervisorEvent::Connected { timestamp, .. }
            | SupervisorEvent::Disconnected { timestamp, .. }
            | SupervisorEvent::DialFailed { timestamp, .. }
            | SupervisorEvent::ReconnectScheduled { timestamp, .. }
            | SupervisorEvent::Stopped { timestamp, .. }
            | SupervisorEvent::ConnectTimedOut { timestamp, .. } => *timestamp,
        }
    }

    fn source_name(&self) -> &str {
        match self {
            SupervisorEvent::Connected { name, .. }
            | SupervisorEvent::Disconnected { name, .. }
            | SupervisorEvent::DialFailed { name, .. }
            | SupervisorEvent::ReconnectScheduled { name, .. }
            | SupervisorEvent::Stopped { name, .. }
            | SupervisorEvent::ConnectTimedOut { name, .. } => name,
        }
    }
}
