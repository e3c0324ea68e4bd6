//! The connection manager: one supervised connection per instance.

use crate::config::SupervisorConfig;
use crate::error::ConnectError;
use crate::events::SupervisorEvent;
use crate::hooks::{self, Bookkeeping};
use crate::supervisor::Supervisor;
use crate::transport::{ErrorStream, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Supervises a single [`Transport`] connection, restarting it whenever it
/// drops or fails to dial.
///
/// Supervision runs in a background task started by
/// [`start_under_scope`](Self::start_under_scope) or implicitly by one of the
/// connect helpers. At most one such task runs per manager. Starting while it
/// is running keeps the task but hands control to the newly passed scope: from
/// then on only that scope (or [`stop`](Self::stop)) ends supervision.
///
/// Starting must happen inside a Tokio runtime. Callers that start the same
/// manager from several tasks at once must serialize those calls themselves.
///
/// Dropping the manager cancels supervision.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tether::tcp::TcpOption;
/// use tether::{Connection, ConnectionManager};
///
/// # async fn example() -> Result<(), tether::ConnectError> {
/// let mut manager = ConnectionManager::tcp(
///     "127.0.0.1:8999",
///     [TcpOption::ConnectTimeout(Duration::from_secs(2))],
/// );
/// manager.set_reconnect_interval(Duration::from_millis(500));
/// manager.set_on_connection_established(|conn| {
///     println!("connected via {:?}", conn.local_addr());
/// });
///
/// manager.connect_with_timeout(Duration::from_secs(5)).await?;
/// assert!(manager.is_connected());
/// manager.stop();
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager<T: Transport> {
    transport: Arc<T>,
    bookkeeping: Arc<Bookkeeping>,
    errors: ErrorStream<T::Error>,
    reconnect_interval: Duration,
    run: Mutex<Option<ActiveRun>>,
}

struct ActiveRun {
    scope: CancellationToken,
    task: JoinHandle<()>,
    /// The caller scope currently in charge of `scope`.
    caller: CancellationToken,
    /// Cancelled to detach `caller` from `scope`.
    binding: CancellationToken,
}

impl ActiveRun {
    fn is_active(&self) -> bool {
        !self.scope.is_cancelled() && !self.caller.is_cancelled() && !self.task.is_finished()
    }

    fn rebind(&mut self, caller: &CancellationToken) {
        self.binding.cancel();
        self.binding = bind(caller, &self.scope);
        self.caller = caller.clone();
    }
}

impl<T: Transport> ConnectionManager<T> {
    /// Creates a manager with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SupervisorConfig::default())
    }

    /// Creates a manager with the given configuration.
    ///
    /// Installs the manager's bookkeeping hooks on `transport`, replacing any
    /// hooks registered on it directly.
    pub fn with_config(transport: T, config: SupervisorConfig) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "tether_reconnects_total",
                "Total number of transport restarts scheduled by the supervisor"
            );
            describe_counter!(
                "tether_connect_timeouts_total",
                "Total number of bounded connect waits that timed out"
            );
            describe_gauge!(
                "tether_connected",
                "Whether the supervised connection is up (1) or down (0)"
            );
        }

        let bookkeeping = Arc::new(Bookkeeping::new(config.name, config.event_listeners));
        let transport = Arc::new(transport);
        transport.set_on_connection_established(hooks::established(Arc::clone(&bookkeeping), None));
        transport.set_on_connection_lost(hooks::lost(Arc::clone(&bookkeeping), None));
        let errors = transport.error_stream();

        Self {
            transport,
            bookkeeping,
            errors,
            reconnect_interval: config.reconnect_interval,
            run: Mutex::new(None),
        }
    }

    /// Sets the pause between a failure and the next restart.
    ///
    /// Takes effect the next time supervision starts; a running loop keeps
    /// the interval it started with.
    pub fn set_reconnect_interval(&mut self, interval: Duration) {
        self.reconnect_interval = interval;
    }

    /// Returns the configured reconnect interval.
    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    /// Registers `handler` to run after the manager's own bookkeeping each
    /// time a connection is established.
    ///
    /// Replaces a previously registered handler.
    pub fn set_on_connection_established<F>(&self, handler: F)
    where
        F: Fn(&T::Connection) + Send + Sync + 'static,
    {
        self.transport.set_on_connection_established(hooks::established(
            Arc::clone(&self.bookkeeping),
            Some(Arc::new(handler)),
        ));
    }

    /// Registers `handler` to run after the manager's own bookkeeping each
    /// time a connection is lost.
    ///
    /// Replaces a previously registered handler.
    pub fn set_on_connection_lost<F>(&self, handler: F)
    where
        F: Fn(&T::Connection) + Send + Sync + 'static,
    {
        self.transport.set_on_connection_lost(hooks::lost(
            Arc::clone(&self.bookkeeping),
            Some(Arc::new(handler)),
        ));
    }

    /// Starts supervision under `scope` and returns immediately.
    ///
    /// Cancelling `scope` (or calling [`stop`](Self::stop)) ends supervision.
    /// If supervision is already running, `scope` replaces the scope it was
    /// started under; the running loop is left undisturbed.
    pub fn start_under_scope(&self, scope: &CancellationToken) {
        self.ensure_running(scope);
    }

    /// Starts supervision under `scope` and waits for a connection.
    ///
    /// Resolves with `Ok(())` once a connection is established, or with
    /// [`ConnectError::Cancelled`] once `scope` is cancelled or the manager
    /// is stopped. Retries are unbounded in between.
    ///
    /// A running manager is handed over to `scope`, as with
    /// [`start_under_scope`](Self::start_under_scope).
    pub async fn connect(&self, scope: &CancellationToken) -> Result<(), ConnectError> {
        let (run_scope, fresh) = self.ensure_running(scope);
        if !fresh && !run_scope.is_cancelled() && self.is_connected() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = scope.cancelled() => Err(ConnectError::Cancelled),
            _ = run_scope.cancelled() => Err(ConnectError::Cancelled),
            _ = self.bookkeeping.state.connect_ok().wait() => Ok(()),
        }
    }

    /// Starts supervision under an internal scope and waits up to `timeout`
    /// for a connection.
    ///
    /// On timeout the manager is stopped, so no supervision outlives the
    /// call, and [`ConnectError::Timeout`] is returned. A running manager is
    /// handed over to the internal scope, leaving [`stop`](Self::stop) as the
    /// only way to end it after a success.
    pub async fn connect_with_timeout(&self, timeout: Duration) -> Result<(), ConnectError> {
        let scope = CancellationToken::new();
        let (run_scope, fresh) = self.ensure_running(&scope);
        if !fresh && !run_scope.is_cancelled() && self.is_connected() {
            return Ok(());
        }

        tokio::select! {
            _ = run_scope.cancelled() => Err(ConnectError::Cancelled),
            _ = self.bookkeeping.state.connect_ok().wait() => Ok(()),
            _ = tokio::time::sleep(timeout) => {
                self.stop();
                self.on_connect_timeout(timeout);
                Err(ConnectError::Timeout { timeout })
            }
        }
    }

    /// Cancels the active scope, if any.
    ///
    /// Cooperative: the supervisor observes the cancellation at its next wait
    /// point, stops the transport, and never restarts it.
    pub fn stop(&self) {
        if let Some(run) = self.run.lock().as_ref() {
            #[cfg(feature = "tracing")]
            debug!(manager = %self.bookkeeping.name, "stop requested");
            run.scope.cancel();
        }
    }

    /// Cancels the active scope and waits for the supervisor task to finish.
    pub async fn shutdown(&self) {
        let run = self.run.lock().take();
        if let Some(run) = run {
            run.scope.cancel();
            let _ = run.task.await;
        }
    }

    /// Whether the most recent lifecycle event was a connect.
    pub fn is_connected(&self) -> bool {
        self.bookkeeping.state.is_connected()
    }

    /// Whether a supervisor task is currently running.
    pub fn is_running(&self) -> bool {
        self.run.lock().as_ref().is_some_and(ActiveRun::is_active)
    }

    /// The transport's live connection, if any.
    pub fn current_connection(&self) -> Option<T::Connection> {
        self.transport.current_connection()
    }

    /// The supervised transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The instance name used in logs, metrics, and events.
    pub fn name(&self) -> &str {
        &self.bookkeeping.name
    }

    /// Spawns the supervisor unless one is already running, and puts `scope`
    /// in charge of it.
    ///
    /// Returns the active run's scope and whether it was freshly spawned.
    fn ensure_running(&self, scope: &CancellationToken) -> (CancellationToken, bool) {
        let mut slot = self.run.lock();
        if let Some(run) = slot.as_mut() {
            if run.is_active() {
                #[cfg(feature = "tracing")]
                debug!(manager = %self.bookkeeping.name, "supervisor already running, rebinding scope");
                run.rebind(scope);
                return (run.scope.clone(), false);
            }
        }

        self.bookkeeping.state.clear_signals();

        let run_scope = CancellationToken::new();
        let binding = bind(scope, &run_scope);
        // The caller's cancellation may not have reached the old run yet.
        let previous = slot.take().map(|run| {
            run.scope.cancel();
            run.task
        });
        let supervisor = Supervisor {
            transport: Arc::clone(&self.transport),
            bookkeeping: Arc::clone(&self.bookkeeping),
            errors: self.errors.clone(),
            scope: run_scope.clone(),
            reconnect_interval: self.reconnect_interval,
        };
        let task = tokio::spawn(supervisor.run(previous));

        *slot = Some(ActiveRun {
            scope: run_scope.clone(),
            task,
            caller: scope.clone(),
            binding,
        });
        (run_scope, true)
    }

    fn on_connect_timeout(&self, timeout: Duration) {
        #[cfg(feature = "metrics")]
        counter!("tether_connect_timeouts_total", "manager" => self.bookkeeping.name.clone())
            .increment(1);

        #[cfg(feature = "tracing")]
        warn!(
            manager = %self.bookkeeping.name,
            timeout_ms = timeout.as_millis() as u64,
            "connect timed out"
        );

        self.bookkeeping.emit(SupervisorEvent::ConnectTimedOut {
            name: self.bookkeeping.name.clone(),
            timestamp: Instant::now(),
            timeout,
        });
    }
}

/// Cancels `run_scope` once `caller` is cancelled, until the returned binding
/// is cancelled or the run ends.
fn bind(caller: &CancellationToken, run_scope: &CancellationToken) -> CancellationToken {
    let binding = run_scope.child_token();
    if caller.is_cancelled() {
        run_scope.cancel();
        return binding;
    }

    let caller = caller.clone();
    let run_scope = run_scope.clone();
    let detached = binding.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = detached.cancelled() => {}
            _ = caller.cancelled() => run_scope.cancel(),
        }
    });
    binding
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            run.scope.cancel();
        }
    }
}

impl<T: Transport> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("name", &self.bookkeeping.name)
            .field("connected", &self.is_connected())
            .field("running", &self.is_running())
            .field("reconnect_interval", &self.reconnect_interval)
            .finish()
    }
}
