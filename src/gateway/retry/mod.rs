//! Configuration for gateway reconnection.

mod strategy;

pub use self::strategy::*;

use std::time::Duration;

/// Configuration used when reconnecting to the gateway after the socket is
/// lost.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Retry {
    /// Strategy used to determine how long to wait between reconnect attempts.
    ///
    /// *Defaults to an [`ExponentialBackoff`] from 1s
    /// to 60s, with a jitter of `0.1`.*
    ///
    /// [`ExponentialBackoff`]: Strategy::Backoff
    pub strategy: Strategy,
    /// The maximum number of consecutive reconnects to attempt without
    /// reaching `READY` or `RESUMED`.
    ///
    /// `None` will attempt an infinite number of retries,
    /// while `Some(0)` will never reconnect.
    ///
    /// *Defaults to `None`.*
    pub retry_limit: Option<usize>,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            strategy: Strategy::Backoff(ExponentialBackoff::default()),
            retry_limit: None,
        }
    }
}

impl Retry {
    /// Returns how long to wait before attempt number `attempt` (from 1),
    /// or `None` if the retry limit has been reached.
    pub(crate) fn retry_in(&self, last_wait: Option<Duration>, attempt: usize) -> Option<Duration> {
        if self.retry_limit.map_or(false, |limit| attempt > limit) {
            None
        } else {
            Some(self.strategy.retry_in(last_wait))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn limit_is_respected() {
        let retry = Retry {
            strategy: Strategy::Every(Duration::from_millis(5)),
            retry_limit: Some(2),
        };

        assert_eq!(retry.retry_in(None, 1), Some(Duration::from_millis(5)));
        assert_eq!(retry.retry_in(None, 2), Some(Duration::from_millis(5)));
        assert_eq!(retry.retry_in(None, 3), None);
        assert!(Retry::default().retry_in(None, 1_000).is_some());
    }
}
