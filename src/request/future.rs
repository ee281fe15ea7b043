use super::{RequestError, RequestResult};
use parking_lot::{Condvar, Mutex};
use std::{
    cell::Cell,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::error;

thread_local! {
    static IN_LISTENER: Cell<bool> = Cell::new(false);
}

/// Lifecycle of a [`QueueableFuture`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FutureState {
    /// Waiting in the queue.
    Pending,
    /// Currently being executed by the queue's worker.
    Executing,
    /// Finished with a value.
    CompletedSuccess,
    /// Finished with an error.
    CompletedError,
    /// Cancelled before execution began, or abandoned on shutdown.
    Cancelled,
}

impl FutureState {
    /// Whether the future holds its final outcome.
    pub fn is_done(self) -> bool {
        !matches!(self, FutureState::Pending | FutureState::Executing)
    }
}

type Listener<T> = Box<dyn FnOnce(&RequestResult<T>) + Send>;

struct Inner<T> {
    state: FutureState,
    outcome: Option<Arc<RequestResult<T>>>,
    listeners: Vec<Listener<T>>,
    fired: bool,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
}

/// Handle to one outbound operation submitted to a [`RequestQueue`].
///
/// Handles are cheap to clone: every clone observes the same operation.
/// The outcome is delivered exactly once, either by awaiting it with
/// [`get`], or by registering a listener with [`then`].
///
/// [`RequestQueue`]: super::RequestQueue
/// [`get`]: QueueableFuture::get
/// [`then`]: QueueableFuture::then
pub struct QueueableFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for QueueableFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for QueueableFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueableFuture")
            .field("state", &self.state())
            .finish()
    }
}

impl<T> QueueableFuture<T> {
    /// Returns the current lifecycle state.
    pub fn state(&self) -> FutureState {
        self.shared.inner.lock().state
    }

    /// Whether the outcome of this operation is known.
    pub fn is_done(&self) -> bool {
        self.state().is_done()
    }
}

impl<T: Send + Sync + 'static> QueueableFuture<T> {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: FutureState::Pending,
                    outcome: None,
                    listeners: vec![],
                    fired: false,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Registers a listener to be called with the outcome.
    ///
    /// Listeners run on the queue's worker thread once the operation
    /// completes (or on the calling thread, if it already has). They
    /// **must not** block or sleep: doing so stalls every request behind
    /// this one.
    pub fn then<F>(&self, listener: F) -> &Self
    where
        F: FnOnce(&RequestResult<T>) + Send + 'static,
    {
        let ready = {
            let mut inner = self.shared.inner.lock();
            if inner.fired {
                inner.outcome.clone()
            } else {
                inner.listeners.push(Box::new(listener));
                return self;
            }
        };

        if let Some(outcome) = ready {
            run_listener(Box::new(listener), &outcome);
        }

        self
    }

    /// Cancels this operation if it has not yet begun.
    ///
    /// Returns `true` if the operation will now never run. Once execution has
    /// started, cancellation has no effect and the original outcome is
    /// still delivered.
    pub fn cancel(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.state != FutureState::Pending {
            return false;
        }

        inner.state = FutureState::Cancelled;
        inner.outcome = Some(Arc::new(Err(RequestError::Cancelled)));
        self.shared.cond.notify_all();

        true
    }

    /// Moves a pending future into execution. Returns `false` if it was
    /// cancelled in the meantime.
    pub(crate) fn begin(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.state == FutureState::Pending {
            inner.state = FutureState::Executing;
            true
        } else {
            false
        }
    }

    /// Stores the outcome and runs every registered listener.
    ///
    /// Only the first completion has any effect.
    pub(crate) fn complete(&self, result: RequestResult<T>) -> bool {
        {
            let mut inner = self.shared.inner.lock();
            if inner.outcome.is_some() {
                return false;
            }

            inner.state = match &result {
                Ok(_) => FutureState::CompletedSuccess,
                Err(RequestError::Cancelled) => FutureState::Cancelled,
                Err(_) => FutureState::CompletedError,
            };
            inner.outcome = Some(Arc::new(result));
            self.shared.cond.notify_all();
        }

        self.fire_listeners();

        true
    }

    /// Cancels (if still pending) and notifies listeners.
    pub(crate) fn abandon(&self) {
        self.cancel();
        self.fire_listeners();
    }

    /// Runs listeners registered before the outcome was known.
    pub(crate) fn fire_listeners(&self) {
        let (listeners, outcome) = {
            let mut inner = self.shared.inner.lock();
            match inner.outcome.clone() {
                Some(outcome) if !inner.fired => {
                    inner.fired = true;
                    (std::mem::take(&mut inner.listeners), outcome)
                },
                _ => return,
            }
        };

        for listener in listeners {
            run_listener(listener, &outcome);
        }
    }

    fn wait_outcome(&self, deadline: Option<Instant>) -> Option<Arc<RequestResult<T>>> {
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(outcome) = &inner.outcome {
                return Some(outcome.clone());
            }

            match deadline {
                Some(deadline) =>
                    if self.shared.cond.wait_until(&mut inner, deadline).timed_out() {
                        return inner.outcome.clone();
                    },
                None => self.shared.cond.wait(&mut inner),
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> QueueableFuture<T> {
    /// Blocks until the outcome is known.
    ///
    /// Calling this from inside a [`then`] listener would deadlock the queue,
    /// so it instead fails with [`RequestError::BlockedInListener`].
    ///
    /// [`then`]: QueueableFuture::then
    pub fn get(&self) -> RequestResult<T> {
        if IN_LISTENER.with(Cell::get) {
            return Err(RequestError::BlockedInListener);
        }

        match self.wait_outcome(None) {
            Some(outcome) => (*outcome).clone(),
            None => Err(RequestError::Cancelled),
        }
    }

    /// Blocks until the outcome is known, or `timeout` elapses.
    ///
    /// Returns `None` on timeout.
    pub fn get_timeout(&self, timeout: Duration) -> Option<RequestResult<T>> {
        if IN_LISTENER.with(Cell::get) {
            return Some(Err(RequestError::BlockedInListener));
        }

        self.wait_outcome(Some(Instant::now() + timeout))
            .map(|outcome| (*outcome).clone())
    }
}

fn run_listener<T>(listener: Listener<T>, outcome: &RequestResult<T>) {
    let was_in = IN_LISTENER.with(|flag| flag.replace(true));

    if catch_unwind(AssertUnwindSafe(|| listener(outcome))).is_err() {
        error!("Request future listener panicked.");
    }

    IN_LISTENER.with(|flag| flag.set(was_in));
}
