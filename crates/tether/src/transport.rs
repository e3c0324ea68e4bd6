//! The boundary between the supervisor and the network client it supervises.
//!
//! A [`Transport`] owns the actual dialing. It is told to start, stop, and
//! restart, and it reports back through two lifecycle hooks and an
//! [`ErrorStream`] of dial failures. The supervisor never looks inside a
//! connection beyond the addresses exposed by [`Connection`].

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// A lifecycle hook, invoked with the connection it concerns.
pub type ConnectionHook<C> = Arc<dyn Fn(&C) + Send + Sync>;

/// Opaque handle to a live connection.
pub trait Connection: Clone + Send + Sync + 'static {
    /// Local address of the connection, if known.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Remote address of the connection, if known.
    fn remote_addr(&self) -> Option<SocketAddr>;
}

/// A network client capable of dialing a single remote endpoint.
///
/// All control methods return immediately; the work they trigger happens in
/// the background and is reported through the hooks and the error stream.
/// Hooks may be invoked from any task.
pub trait Transport: Send + Sync + 'static {
    /// Handle passed to lifecycle hooks.
    type Connection: Connection;

    /// Error reported when a dial attempt fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Begins an asynchronous dial attempt.
    fn start(&self);

    /// Tears down the current connection or dial attempt.
    ///
    /// Must be a no-op when nothing is running. If a connection was announced
    /// through the established hook, the lost hook must follow.
    fn stop(&self);

    /// Tears down whatever is running and dials again.
    fn restart(&self);

    /// Replaces the hook invoked when a connection is established.
    fn set_on_connection_established(&self, hook: ConnectionHook<Self::Connection>);

    /// Replaces the hook invoked when an established connection goes away.
    fn set_on_connection_lost(&self, hook: ConnectionHook<Self::Connection>);

    /// Stream of asynchronous dial failures.
    fn error_stream(&self) -> ErrorStream<Self::Error>;

    /// The live connection, if any.
    fn current_connection(&self) -> Option<Self::Connection>;
}

/// Producer side of an [`ErrorStream`].
#[derive(Debug)]
pub struct ErrorSink<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> Clone for ErrorSink<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> ErrorSink<E> {
    /// Reports a dial failure. Never blocks; dropped if the stream is gone.
    pub fn report(&self, error: E) {
        let _ = self.tx.send(error);
    }
}

/// Readable stream of dial failures shared between a transport and its
/// supervisor.
///
/// Cloning yields another handle to the same stream; each error is delivered
/// to exactly one reader.
#[derive(Debug)]
pub struct ErrorStream<E> {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<E>>>,
}

impl<E> Clone for ErrorStream<E> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<E> ErrorStream<E> {
    /// Creates a connected sink/stream pair.
    pub fn channel() -> (ErrorSink<E>, ErrorStream<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ErrorSink { tx },
            ErrorStream {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Receives the next error, or `None` once every sink has been dropped.
    ///
    /// Cancel safe.
    pub async fn recv(&self) -> Option<E> {
        self.rx.lock().await.recv().await
    }

    /// Discards every error currently queued, returning how many there were.
    pub fn clear(&self) -> usize {
        let Ok(mut rx) = self.rx.try_lock() else {
            return 0;
        };
        let mut cleared = 0;
        while rx.try_recv().is_ok() {
            cleared += 1;
        }
        cleared
    }
}
