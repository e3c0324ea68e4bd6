//! Core infrastructure for tether.
//!
//! This crate provides the pieces shared by the connection supervisor:
//! - Event system for observability
//! - Single-slot coalescing signals used to turn callbacks into awaitable events

pub mod events;
pub mod signal;

pub use events::{EventListener, EventListeners, FnListener, LifecycleEvent};
pub use signal::Signal;
