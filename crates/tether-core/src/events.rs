//! Lifecycle event system.
//!
//! Supervisors describe what happened to a connection by emitting events to
//! an ordered set of listeners. Listeners are observers only: they cannot
//! influence reconnection and a panicking listener never stops the others
//! from running.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted over the lifetime of a supervised connection.
pub trait LifecycleEvent: Send + Sync + fmt::Debug {
    /// Returns a short, stable identifier (e.g., "connected", "dial_failed").
    fn event_type(&self) -> &'static str;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Instant;

    /// Returns the name of the supervisor instance that emitted this event.
    fn source_name(&self) -> &str;
}

/// Trait for listening to lifecycle events.
pub trait EventListener<E: LifecycleEvent>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

type SharedListener<E> = Arc<dyn EventListener<E>>;

/// An ordered collection of event listeners.
///
/// Listeners run in registration order.
pub struct EventListeners<E: LifecycleEvent> {
    listeners: Vec<SharedListener<E>>,
}

impl<E: LifecycleEvent> Clone for EventListeners<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<E: LifecycleEvent> EventListeners<E> {
    /// Creates an empty listener collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Appends a listener.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Delivers `event` to every listener.
    ///
    /// A panic inside one listener is caught so the remaining listeners are
    /// still called and the emitting task keeps running.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            #[cfg(feature = "tracing")]
            if outcome.is_err() {
                tracing::warn!(
                    source = event.source_name(),
                    event = event.event_type(),
                    "event listener panicked"
                );
            }
            #[cfg(not(feature = "tracing"))]
            let _ = outcome;
        }
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: LifecycleEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: LifecycleEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// A closure-backed event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _event: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Wraps `f` as a listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: LifecycleEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
