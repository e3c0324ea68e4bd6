//! A plain TCP [`Transport`].
//!
//! `TcpTransport` dials an address, holds the socket open, and reports when
//! the peer goes away. It speaks no protocol: inbound bytes are read and
//! discarded. It is enough to supervise reachability of an endpoint and is
//! what the integration tests and the demo run against.

use crate::manager::ConnectionManager;
use crate::transport::{Connection, ConnectionHook, ErrorSink, ErrorStream, Transport};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default bound on a single dial attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Options passed through to [`TcpTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpOption {
    /// Bound on a single dial attempt. Default: 3 seconds.
    ConnectTimeout(Duration),
    /// Sets `TCP_NODELAY` on established sockets. Default: off.
    NoDelay(bool),
}

/// Errors reported on a [`TcpTransport`]'s error stream.
#[derive(Debug, Error)]
pub enum TcpTransportError {
    /// The dial failed outright.
    #[error("dial {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The dial did not complete within the connect timeout.
    #[error("dial {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },
}

/// Handle to an established TCP connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConnection {
    id: u64,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
}

impl TcpConnection {
    /// Identifier unique within the transport that produced it.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Connection for TcpConnection {
    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.remote_addr)
    }
}

/// Dials a single TCP endpoint on demand.
///
/// The established hook runs before the connection becomes visible through
/// [`current_connection`](Transport::current_connection). Every announced
/// connection is followed by exactly one lost hook, fired synchronously by
/// [`stop`](Transport::stop) when it finds a live connection.
pub struct TcpTransport {
    inner: Arc<Inner>,
}

struct Inner {
    addr: String,
    connect_timeout: Duration,
    nodelay: bool,
    on_established: Mutex<Option<ConnectionHook<TcpConnection>>>,
    on_lost: Mutex<Option<ConnectionHook<TcpConnection>>>,
    current: Mutex<Option<TcpConnection>>,
    session: Mutex<Option<Session>>,
    errors: ErrorSink<TcpTransportError>,
    error_stream: ErrorStream<TcpTransportError>,
    next_id: AtomicU64,
}

struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Session {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl TcpTransport {
    /// Creates a transport for `addr` with default options.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_options(addr, [])
    }

    /// Creates a transport for `addr`, applying `options` in order.
    pub fn with_options(
        addr: impl Into<String>,
        options: impl IntoIterator<Item = TcpOption>,
    ) -> Self {
        let mut connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        let mut nodelay = false;
        for option in options {
            match option {
                TcpOption::ConnectTimeout(timeout) => connect_timeout = timeout,
                TcpOption::NoDelay(enabled) => nodelay = enabled,
            }
        }

        let (errors, error_stream) = ErrorStream::channel();
        Self {
            inner: Arc::new(Inner {
                addr: addr.into(),
                connect_timeout,
                nodelay,
                on_established: Mutex::new(None),
                on_lost: Mutex::new(None),
                current: Mutex::new(None),
                session: Mutex::new(None),
                errors,
                error_stream,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// The address being dialed.
    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    /// The bound on a single dial attempt.
    pub fn connect_timeout(&self) -> Duration {
        self.inner.connect_timeout
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TcpTransportError;

    fn start(&self) {
        let mut session = self.inner.session.lock();
        if session.as_ref().is_some_and(Session::is_active) {
            return;
        }

        let previous = session.take().map(|s| s.task);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&self.inner).run_session(cancel.clone(), previous));
        *session = Some(Session { cancel, task });
    }

    fn stop(&self) {
        if let Some(session) = self.inner.session.lock().as_ref() {
            session.cancel.cancel();
        }

        let live = self.inner.current.lock().take();
        if let Some(conn) = live {
            self.inner.fire_lost(&conn);
        }
    }

    fn restart(&self) {
        self.stop();
        self.start();
    }

    fn set_on_connection_established(&self, hook: ConnectionHook<TcpConnection>) {
        *self.inner.on_established.lock() = Some(hook);
    }

    fn set_on_connection_lost(&self, hook: ConnectionHook<TcpConnection>) {
        *self.inner.on_lost.lock() = Some(hook);
    }

    fn error_stream(&self) -> ErrorStream<TcpTransportError> {
        self.inner.error_stream.clone()
    }

    fn current_connection(&self) -> Option<TcpConnection> {
        self.inner.current.lock().clone()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(session) = self.inner.session.lock().as_ref() {
            session.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("addr", &self.inner.addr)
            .field("connect_timeout", &self.inner.connect_timeout)
            .field("nodelay", &self.inner.nodelay)
            .finish()
    }
}

impl Inner {
    async fn run_session(self: Arc<Self>, cancel: CancellationToken, previous: Option<JoinHandle<()>>) {
        if let Some(previous) = previous {
            let _ = previous.await;
        }

        let dial = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr.as_str()));
        let dialed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            dialed = dial => dialed,
        };

        let stream = match dialed {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                self.report(&cancel, TcpTransportError::Connect {
                    addr: self.addr.clone(),
                    source,
                });
                return;
            }
            Err(_) => {
                self.report(&cancel, TcpTransportError::ConnectTimeout {
                    addr: self.addr.clone(),
                    timeout: self.connect_timeout,
                });
                return;
            }
        };

        let conn = match self.describe(&stream) {
            Ok(conn) => conn,
            Err(source) => {
                self.report(&cancel, TcpTransportError::Connect {
                    addr: self.addr.clone(),
                    source,
                });
                return;
            }
        };
        if self.nodelay {
            if let Err(err) = stream.set_nodelay(true) {
                #[cfg(feature = "tracing")]
                tracing::warn!(addr = %self.addr, error = %err, "failed to set TCP_NODELAY");
                #[cfg(not(feature = "tracing"))]
                let _ = err;
            }
        }

        // A session stopped while dialing never announces its connection.
        if cancel.is_cancelled() {
            return;
        }
        self.fire_established(&conn);

        // Publishing under the lock pairs with stop(): either stop() finds the
        // connection and reports the loss, or we see the cancellation here.
        let published = {
            let mut current = self.current.lock();
            if cancel.is_cancelled() {
                false
            } else {
                *current = Some(conn.clone());
                true
            }
        };
        if !published {
            self.fire_lost(&conn);
            return;
        }

        hold(stream, &cancel).await;

        let lost = {
            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|c| c.id == conn.id) {
                current.take()
            } else {
                None
            }
        };
        if let Some(conn) = lost {
            self.fire_lost(&conn);
        }
    }

    /// Reports a dial failure unless the session has already been stopped.
    fn report(&self, cancel: &CancellationToken, err: TcpTransportError) {
        if !cancel.is_cancelled() {
            self.errors.report(err);
        }
    }

    fn describe(&self, stream: &TcpStream) -> io::Result<TcpConnection> {
        Ok(TcpConnection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            local_addr: stream.local_addr()?,
            remote_addr: stream.peer_addr()?,
        })
    }

    fn fire_established(&self, conn: &TcpConnection) {
        let hook = self.on_established.lock().clone();
        if let Some(hook) = hook {
            hook(conn);
        }
    }

    fn fire_lost(&self, conn: &TcpConnection) {
        let hook = self.on_lost.lock().clone();
        if let Some(hook) = hook {
            hook(conn);
        }
    }
}

/// Keeps the socket open until the peer closes it, it errors, or `cancel`
/// fires.
async fn hold(mut stream: TcpStream, cancel: &CancellationToken) {
    let mut buf = [0u8; 1024];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            read = stream.read(&mut buf) => match read {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
        }
    }
}

impl ConnectionManager<TcpTransport> {
    /// Creates a manager supervising a TCP connection to `addr`.
    ///
    /// `options` are handed to the transport untouched.
    pub fn tcp(addr: impl Into<String>, options: impl IntoIterator<Item = TcpOption>) -> Self {
        Self::new(TcpTransport::with_options(addr, options))
    }
}
