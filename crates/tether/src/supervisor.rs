//! The background loop that keeps a transport connected.
//!
//! While running, the loop waits for whichever comes first: cancellation of
//! its scope, a disconnect signal, or a dial error. Disconnects and dial
//! errors both lead to a fixed pause followed by a transport restart, with no
//! limit on attempts. Cancellation stops the transport and ends the loop;
//! nothing is restarted after it has been observed, including during the
//! pause.

use crate::events::{ReconnectReason, SupervisorEvent};
use crate::hooks::Bookkeeping;
use crate::transport::{ErrorStream, Transport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::{debug, error};

pub(crate) struct Supervisor<T: Transport> {
    pub(crate) transport: Arc<T>,
    pub(crate) bookkeeping: Arc<Bookkeeping>,
    pub(crate) errors: ErrorStream<T::Error>,
    pub(crate) scope: CancellationToken,
    pub(crate) reconnect_interval: Duration,
}

impl<T: Transport> Supervisor<T> {
    /// Runs until the scope is cancelled.
    ///
    /// `previous` is the task of an earlier, already cancelled run; it must
    /// finish its teardown before this run touches the transport.
    pub(crate) async fn run(self, previous: Option<JoinHandle<()>>) {
        if let Some(previous) = previous {
            let _ = previous.await;
        }

        // Leftovers from an earlier run must not look like fresh events.
        self.bookkeeping.state.clear_signals();
        self.errors.clear();

        if self.scope.is_cancelled() {
            self.finish();
            return;
        }

        #[cfg(feature = "tracing")]
        debug!(
            manager = %self.bookkeeping.name,
            reconnect_interval_ms = self.reconnect_interval.as_millis() as u64,
            "supervisor started"
        );

        self.transport.start();

        loop {
            let reason = tokio::select! {
                _ = self.scope.cancelled() => break,
                _ = self.bookkeeping.state.disconnected().wait() => ReconnectReason::Disconnect,
                Some(err) = self.errors.recv() => {
                    self.on_dial_error(&err);
                    ReconnectReason::DialError
                }
            };

            if !self.backoff(reason).await {
                break;
            }
            self.transport.restart();
        }

        self.finish();
    }

    fn on_dial_error(&self, err: &T::Error) {
        #[cfg(feature = "tracing")]
        error!(
            manager = %self.bookkeeping.name,
            error = %err,
            reconnect_after_ms = self.reconnect_interval.as_millis() as u64,
            "dial failed"
        );

        self.bookkeeping.emit(SupervisorEvent::DialFailed {
            name: self.bookkeeping.name.clone(),
            timestamp: Instant::now(),
            error: err.to_string(),
        });
    }

    /// Sleeps for the reconnect interval. Returns `false` if the scope was
    /// cancelled first.
    async fn backoff(&self, reason: ReconnectReason) -> bool {
        #[cfg(feature = "tracing")]
        error!(
            manager = %self.bookkeeping.name,
            reason = reason.as_str(),
            reconnect_after_ms = self.reconnect_interval.as_millis() as u64,
            "reconnecting"
        );

        #[cfg(feature = "metrics")]
        counter!(
            "tether_reconnects_total",
            "manager" => self.bookkeeping.name.clone(),
            "reason" => reason.as_str()
        )
        .increment(1);

        self.bookkeeping.emit(SupervisorEvent::ReconnectScheduled {
            name: self.bookkeeping.name.clone(),
            timestamp: Instant::now(),
            reason,
            delay: self.reconnect_interval,
        });

        tokio::select! {
            _ = self.scope.cancelled() => false,
            _ = tokio::time::sleep(self.reconnect_interval) => true,
        }
    }

    fn finish(&self) {
        #[cfg(feature = "tracing")]
        debug!(
            manager = %self.bookkeeping.name,
            had_connection = self.transport.current_connection().is_some(),
            "supervisor stopping"
        );

        // Unconditional: an in-flight dial has no connection yet but must
        // still be aborted.
        self.transport.stop();

        self.bookkeeping.emit(SupervisorEvent::Stopped {
            name: self.bookkeeping.name.clone(),
            timestamp: Instant::now(),
        });
    }
}
