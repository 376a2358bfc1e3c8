//! Reconnect delays.

use std::time::Duration;

/// Fixed reconnect delays.
///
/// A clean disconnect (device reboot, network blip) is expected and
/// retried quickly. A failure (refused connection, bad credentials,
/// unreachable host) waits longer so a broken device does not spin.
/// There is no retry limit.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use vtod::supervisor::BackoffPolicy;
///
/// let policy = BackoffPolicy::default();
/// assert_eq!(policy.disconnect_delay, Duration::from_secs(5));
///
/// let fast = BackoffPolicy::new()
///     .with_disconnect_delay(Duration::from_millis(10))
///     .with_error_delay(Duration::from_millis(50));
/// assert_eq!(fast.error_delay, Duration::from_millis(50));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the peer closed the session.
    pub disconnect_delay: Duration,
    /// Delay after a connect or session error.
    pub error_delay: Duration,
}

impl BackoffPolicy {
    /// Clean disconnect delay.
    pub const DEFAULT_DISCONNECT_DELAY: Duration = Duration::from_secs(5);
    /// Error delay.
    pub const DEFAULT_ERROR_DELAY: Duration = Duration::from_secs(30);

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay after a clean disconnect.
    #[must_use]
    pub fn with_disconnect_delay(mut self, delay: Duration) -> Self {
        self.disconnect_delay = delay;
        self
    }

    /// Sets the delay after an error.
    #[must_use]
    pub fn with_error_delay(mut self, delay: Duration) -> Self {
        self.error_delay = delay;
        self
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            disconnect_delay: Self::DEFAULT_DISCONNECT_DELAY,
            error_delay: Self::DEFAULT_ERROR_DELAY,
        }
    }
}
