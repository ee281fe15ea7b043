//! A resettable condition signal which threads may block upon.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Condition signal used to gate readiness, such as waiting for every guild
/// announced in `READY` to arrive.
///
/// Unlike a one-shot channel, an `EventAwaiter` can be [`reset`] and
/// triggered again: it models a level (on/off) rather than an edge.
///
/// [`reset`]: EventAwaiter::reset
#[derive(Debug, Default)]
pub struct EventAwaiter {
    triggered: Mutex<bool>,
    cond: Condvar,
}

impl EventAwaiter {
    /// Creates a new, untriggered, awaiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the condition as met, waking every waiting thread.
    pub fn trigger(&self) {
        let mut triggered = self.triggered.lock();
        *triggered = true;
        self.cond.notify_all();
    }

    /// Marks the condition as unmet. Later calls to [`wait`] will block.
    ///
    /// [`wait`]: EventAwaiter::wait
    pub fn reset(&self) {
        *self.triggered.lock() = false;
    }

    /// Returns whether the condition is currently met.
    pub fn is_triggered(&self) -> bool {
        *self.triggered.lock()
    }

    /// Blocks until the condition is met.
    pub fn wait(&self) {
        let mut triggered = self.triggered.lock();
        while !*triggered {
            self.cond.wait(&mut triggered);
        }
    }

    /// Blocks until the condition is met, or `timeout` elapses.
    ///
    /// Returns `true` if the condition was met.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut triggered = self.triggered.lock();
        while !*triggered {
            if self.cond.wait_until(&mut triggered, deadline).timed_out() {
                return *triggered;
            }
        }

        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn wait_returns_once_triggered() {
        let awaiter = Arc::new(EventAwaiter::new());
        let remote = awaiter.clone();

        let waiter = thread::spawn(move || {
            remote.wait();
            remote.is_triggered()
        });

        thread::sleep(Duration::from_millis(20));
        awaiter.trigger();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn wait_timeout_expires_when_untriggered() {
        let awaiter = EventAwaiter::new();
        assert!(!awaiter.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn reset_rearms_the_condition() {
        let awaiter = EventAwaiter::new();
        awaiter.trigger();
        assert!(awaiter.wait_timeout(Duration::from_millis(1)));

        awaiter.reset();
        assert!(!awaiter.is_triggered());
        assert!(!awaiter.wait_timeout(Duration::from_millis(1)));
    }
}
