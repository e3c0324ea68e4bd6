use std::time::Duration;
use thiserror::Error;

/// Errors returned by the connect helpers of
/// [`ConnectionManager`](crate::ConnectionManager).
///
/// Dial failures and disconnects never show up here; the supervisor retries
/// those on its own. Only the caller-facing outcomes of waiting do.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The scope governing the wait was cancelled before a connection was made.
    #[error("connect cancelled")]
    Cancelled,

    /// No connection was made within the allotted time.
    #[error("connect timeout after {timeout:?}")]
    Timeout {
        /// The duration that elapsed.
        timeout: Duration,
    },
}

impl ConnectError {
    /// Returns true if the wait timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectError::Timeout { .. })
    }

    /// Returns true if the wait was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConnectError::Cancelled)
    }
}
