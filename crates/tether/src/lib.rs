//! Supervised, auto-reconnecting connections.
//!
//! `tether` wraps a network client that can only make single-shot connection
//! attempts (a [`Transport`]) and turns it into a session that reconnects on
//! its own. A [`ConnectionManager`] watches the transport's lifecycle hooks
//! and dial errors, waits a fixed interval after every failure, and restarts
//! the transport until it is told to stop.
//!
//! # Features
//!
//! - **Background supervision**: [`ConnectionManager::start_under_scope`]
//!   returns immediately and keeps reconnecting until the scope is cancelled
//! - **Blocking-style connects**: [`ConnectionManager::connect`] and
//!   [`ConnectionManager::connect_with_timeout`] wait for the first success
//! - **Composing hooks**: caller handlers run after the manager's own
//!   bookkeeping and never replace it
//! - **Event system**: observe connects, losses, dial failures, and
//!   reconnects through [`SupervisorConfig`] listeners
//! - **TCP transport**: [`tcp::TcpTransport`] supervises plain TCP
//!   reachability
//!
//! # Examples
//!
//! ## Keep a connection alive in the background
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tether::{ConnectionManager, SupervisorConfig};
//! use tether::tcp::TcpTransport;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let config = SupervisorConfig::builder()
//!     .name("upstream")
//!     .reconnect_interval(Duration::from_millis(200))
//!     .on_reconnect(|reason, delay| {
//!         println!("reconnecting after {reason} in {delay:?}");
//!     })
//!     .build();
//!
//! let manager = ConnectionManager::with_config(TcpTransport::new("127.0.0.1:8999"), config);
//! let scope = CancellationToken::new();
//! manager.start_under_scope(&scope);
//!
//! // ... later
//! scope.cancel();
//! # }
//! ```
//!
//! ## Wait for the first connection
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tether::ConnectionManager;
//!
//! # async fn example() {
//! let manager = ConnectionManager::tcp("127.0.0.1:8999", []);
//! match manager.connect_with_timeout(Duration::from_secs(1)).await {
//!     Ok(()) => assert!(manager.is_connected()),
//!     Err(e) if e.is_timeout() => eprintln!("{e}"),
//!     Err(e) => eprintln!("unexpected: {e}"),
//! }
//! # }
//! ```

mod config;
mod error;
mod events;
mod hooks;
mod manager;
mod state;
mod supervisor;
pub mod tcp;
mod transport;

pub use config::{SupervisorConfig, SupervisorConfigBuilder, DEFAULT_RECONNECT_INTERVAL};
pub use error::ConnectError;
pub use events::{ReconnectReason, SupervisorEvent};
pub use manager::ConnectionManager;
pub use transport::{Connection, ConnectionHook, ErrorSink, ErrorStream, Transport};

// Re-export the cancellation scope type and the event plumbing for convenience
pub use tether_core::{EventListener, LifecycleEvent};
pub use tokio_util::sync::CancellationToken;
