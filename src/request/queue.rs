use super::{QueueableFuture, RequestError, RequestResult, ShutdownOption};
use crate::Config;
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    fmt,
    marker::PhantomData,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, instrument, trace, warn};

/// A unit of work which can be run by a [`RequestQueue`].
pub trait Queueable: Send + 'static {
    /// Value produced on success.
    type Output: Send + Sync + 'static;

    /// Runs the operation to completion on the queue's worker thread.
    ///
    /// Returning [`RequestError::RateLimited`] causes the queue to wait and
    /// call this again, up to its configured retry limit.
    fn execute(&mut self) -> RequestResult<Self::Output>;
}

/// [`Queueable`] adapter for plain closures. See [`task_fn`].
pub struct FnTask<F, T> {
    func: F,
    _output: PhantomData<fn() -> T>,
}

/// Wraps a closure so that it may be submitted to a [`RequestQueue`].
pub fn task_fn<F, T>(func: F) -> FnTask<F, T>
where
    F: FnMut() -> RequestResult<T> + Send + 'static,
    T: Send + Sync + 'static,
{
    FnTask {
        func,
        _output: PhantomData,
    }
}

impl<F, T> Queueable for FnTask<F, T>
where
    F: FnMut() -> RequestResult<T> + Send + 'static,
    T: Send + Sync + 'static,
{
    type Output = T;

    fn execute(&mut self) -> RequestResult<T> {
        (self.func)()
    }
}

trait Entry: Send {
    fn run(self: Box<Self>, retry_limit: usize);

    fn abandon(self: Box<Self>);
}

struct QueuedEntry<Q: Queueable> {
    task: Q,
    future: QueueableFuture<Q::Output>,
}

impl<Q: Queueable> Entry for QueuedEntry<Q> {
    fn run(mut self: Box<Self>, retry_limit: usize) {
        if !self.future.begin() {
            trace!("Skipping cancelled request.");
            self.future.fire_listeners();
            return;
        }

        let mut retries = 0;
        let result = loop {
            match self.task.execute() {
                Err(RequestError::RateLimited {
                    retry_after,
                    global,
                }) if retries < retry_limit => {
                    retries += 1;
                    warn!(
                        "Rate limited (global: {}), retrying in {:?} ({}/{}).",
                        global, retry_after, retries, retry_limit
                    );
                    thread::sleep(retry_after);
                },
                other => break other,
            }
        };

        self.future.complete(result);
    }

    fn abandon(self: Box<Self>) {
        self.future.abandon();
    }
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<Box<dyn Entry>>,
    shutdown: Option<ShutdownOption>,
    halted: bool,
}

struct QueueShared {
    state: Mutex<QueueState>,
    cond: Condvar,
    poll_interval: Duration,
    retry_limit: usize,
}

/// A FIFO queue of outbound operations drained by a single worker thread.
///
/// Dropping the queue requests a [`QUEUE_STOP_IF_EMPTY`] shutdown, so
/// already-submitted work still runs.
///
/// [`QUEUE_STOP_IF_EMPTY`]: ShutdownOption::QUEUE_STOP_IF_EMPTY
pub struct RequestQueue {
    shared: Arc<QueueShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("RequestQueue")
            .field("queued", &state.entries.len())
            .field("shutdown", &state.shutdown)
            .field("halted", &state.halted)
            .finish()
    }
}

impl RequestQueue {
    /// Creates a queue using the request settings from `config`, and starts
    /// its worker thread.
    pub fn new(config: &Config) -> Self {
        Self::with_limits(config.request_retry_limit, config.queue_poll_interval)
    }

    /// Creates a queue with explicit rate-limit retry and idle poll settings.
    pub fn with_limits(retry_limit: usize, poll_interval: Duration) -> Self {
        let shared = Arc::new(QueueShared {
            state: Mutex::new(QueueState::default()),
            cond: Condvar::new(),
            poll_interval,
            retry_limit,
        });

        let remote = shared.clone();
        let worker = thread::Builder::new()
            .name("courier-request-queue".into())
            .spawn(move || {
                trace!("Request queue started.");
                runner(&remote);
                trace!("Request queue finished.");
            })
            .map_err(|e| warn!("Failed to spawn request queue worker: {}", e))
            .ok();

        if worker.is_none() {
            shared.state.lock().halted = true;
        }

        Self {
            shared,
            worker: Mutex::new(worker),
        }
    }

    /// Adds a task to the back of the queue.
    ///
    /// Fails with [`RequestError::ShuttingDown`] once shutdown has begun,
    /// unless [`QUEUE_ACCEPT_NEW_FUTURES`] was given.
    ///
    /// [`QUEUE_ACCEPT_NEW_FUTURES`]: ShutdownOption::QUEUE_ACCEPT_NEW_FUTURES
    pub fn submit<Q: Queueable>(&self, task: Q) -> RequestResult<QueueableFuture<Q::Output>> {
        let future = QueueableFuture::new();

        let mut state = self.shared.state.lock();
        if state.halted || state.shutdown.map_or(false, ShutdownOption::refuses_new) {
            return Err(RequestError::ShuttingDown);
        }

        state.entries.push_back(Box::new(QueuedEntry {
            task,
            future: future.clone(),
        }));
        self.shared.cond.notify_one();

        Ok(future)
    }

    /// Returns the number of tasks waiting to be run.
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Returns whether no tasks are waiting to be run.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the worker has stopped and no further work will run.
    pub fn is_halted(&self) -> bool {
        self.shared.state.lock().halted
    }

    /// Begins shutting down the queue.
    ///
    /// This does not wait for the worker to exit: see [`join`].
    ///
    /// [`join`]: RequestQueue::join
    pub fn shutdown(&self, options: ShutdownOption) -> RequestResult<()> {
        let options = options.validate()?;
        debug!("Request queue shutting down: {:?}.", options);

        let mut state = self.shared.state.lock();
        state.shutdown = Some(options);
        self.shared.cond.notify_all();

        Ok(())
    }

    /// Blocks until the worker thread has exited.
    ///
    /// This only returns once [`shutdown`] has been called.
    ///
    /// [`shutdown`]: RequestQueue::shutdown
    pub fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Request queue worker panicked.");
            }
        }
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        if state.shutdown.is_none() {
            state.shutdown = Some(ShutdownOption::QUEUE_STOP_IF_EMPTY);
            self.shared.cond.notify_all();
        }
    }
}

#[instrument(skip(shared))]
fn runner(shared: &QueueShared) {
    loop {
        let entry = {
            let mut state = shared.state.lock();
            loop {
                if let Some(opts) = state.shutdown {
                    if opts.contains(ShutdownOption::QUEUE_STOP_IMMEDIATELY) {
                        state.halted = true;
                        let abandoned = std::mem::take(&mut state.entries);
                        drop(state);

                        debug!("Abandoning {} queued requests.", abandoned.len());
                        for entry in abandoned {
                            entry.abandon();
                        }
                        return;
                    }
                }

                if let Some(entry) = state.entries.pop_front() {
                    break entry;
                }

                if state.shutdown.is_some() {
                    state.halted = true;
                    return;
                }

                // Bounded, so that a missed notification only delays pickup.
                shared.cond.wait_for(&mut state, shared.poll_interval);
            }
        };

        entry.run(shared.retry_limit);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::request::FutureState;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn queue() -> RequestQueue {
        RequestQueue::with_limits(3, Duration::from_millis(10))
    }

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    ) -> FnTask<impl FnMut() -> RequestResult<&'static str> + Send + 'static, &'static str> {
        let log = log.clone();
        task_fn(move || {
            log.lock().push(name);
            Ok(name)
        })
    }

    #[test]
    fn requests_run_in_order_without_overlap() {
        let queue = queue();
        let busy = Arc::new(AtomicBool::new(false));
        let order = Arc::new(Mutex::new(vec![]));

        let futures: Vec<_> = (0..16)
            .map(|i| {
                let busy = busy.clone();
                let order = order.clone();
                queue
                    .submit(task_fn(move || {
                        assert!(!busy.swap(true, Ordering::SeqCst), "overlapping execution");
                        thread::sleep(Duration::from_millis(1));
                        order.lock().push(i);
                        busy.store(false, Ordering::SeqCst);
                        Ok(i)
                    }))
                    .unwrap()
            })
            .collect();

        for (i, fut) in futures.iter().enumerate() {
            assert_eq!(fut.get().unwrap(), i);
        }

        assert_eq!(*order.lock(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn futures_can_be_awaited_from_other_threads() {
        fn assert_send<T: Send>(_: &T) {}

        let queue = queue();
        let fut = queue.submit(task_fn(|| Ok(String::from("done")))).unwrap();
        assert_send(&fut);

        let waiter = thread::spawn(move || fut.get());

        assert_eq!(waiter.join().unwrap().unwrap(), "done");
    }

    #[test]
    fn cancelled_request_is_skipped() {
        let queue = queue();
        let log = Arc::new(Mutex::new(vec![]));
        let (release_tx, release_rx) = flume::bounded::<()>(0);

        let a_log = log.clone();
        let a = queue
            .submit(task_fn(move || {
                let _ = release_rx.recv();
                a_log.lock().push("A");
                Ok("A")
            }))
            .unwrap();
        let b = queue.submit(recorder(&log, "B")).unwrap();
        let c = queue.submit(recorder(&log, "C")).unwrap();

        let b_seen = Arc::new(Mutex::new(None));
        let sink = b_seen.clone();
        b.then(move |res| *sink.lock() = Some(res.clone()));

        assert!(b.cancel());
        release_tx.send(()).unwrap();

        assert_eq!(a.get().unwrap(), "A");
        assert_eq!(c.get().unwrap(), "C");
        assert!(b.get().unwrap_err().is_cancelled());
        assert_eq!(b.state(), FutureState::Cancelled);
        assert!(matches!(*b_seen.lock(), Some(Err(RequestError::Cancelled))));
        assert_eq!(*log.lock(), vec!["A", "C"]);
    }

    #[test]
    fn cancel_after_start_has_no_effect() {
        let queue = queue();
        let (started_tx, started_rx) = flume::bounded::<()>(1);
        let (release_tx, release_rx) = flume::bounded::<()>(0);

        let fut = queue
            .submit(task_fn(move || {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
                Ok(7u32)
            }))
            .unwrap();

        started_rx.recv().unwrap();
        assert_eq!(fut.state(), FutureState::Executing);
        assert!(!fut.cancel());
        release_tx.send(()).unwrap();

        assert_eq!(fut.get().unwrap(), 7);
    }

    #[test]
    fn rate_limits_are_retried() {
        let queue = queue();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let fut = queue
            .submit(task_fn(move || {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RequestError::RateLimited {
                        retry_after: Duration::from_millis(1),
                        global: false,
                    })
                } else {
                    Ok(())
                }
            }))
            .unwrap();

        assert!(fut.get().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rate_limit_retries_are_bounded() {
        let queue = RequestQueue::with_limits(1, Duration::from_millis(10));
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let fut = queue
            .submit(task_fn(move || -> RequestResult<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RequestError::RateLimited {
                    retry_after: Duration::from_millis(1),
                    global: true,
                })
            }))
            .unwrap();

        assert!(matches!(fut.get(), Err(RequestError::RateLimited { .. })));
        assert_eq!(fut.state(), FutureState::CompletedError);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn immediate_shutdown_abandons_queued_work() {
        let queue = queue();
        let log = Arc::new(Mutex::new(vec![]));
        let (started_tx, started_rx) = flume::bounded::<()>(1);
        let (release_tx, release_rx) = flume::bounded::<()>(0);

        let a = queue
            .submit(task_fn(move || {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
                Ok("A")
            }))
            .unwrap();
        let b = queue.submit(recorder(&log, "B")).unwrap();

        started_rx.recv().unwrap();
        queue
            .shutdown(ShutdownOption::QUEUE_STOP_IMMEDIATELY)
            .unwrap();
        assert!(matches!(
            queue.submit(recorder(&log, "C")),
            Err(RequestError::ShuttingDown)
        ));
        release_tx.send(()).unwrap();
        queue.join();

        assert_eq!(a.get().unwrap(), "A");
        assert!(b.get().unwrap_err().is_cancelled());
        assert!(log.lock().is_empty());
        assert!(queue.is_halted());
    }

    #[test]
    fn drain_shutdown_runs_remaining_work() {
        let queue = queue();
        let log = Arc::new(Mutex::new(vec![]));
        let (release_tx, release_rx) = flume::bounded::<()>(0);

        queue
            .submit(task_fn(move || {
                let _ = release_rx.recv();
                Ok("A")
            }))
            .unwrap();
        let b = queue.submit(recorder(&log, "B")).unwrap();

        queue
            .shutdown(ShutdownOption::QUEUE_STOP_IF_EMPTY | ShutdownOption::QUEUE_ACCEPT_NEW_FUTURES)
            .unwrap();
        let c = queue.submit(recorder(&log, "C")).unwrap();
        release_tx.send(()).unwrap();
        queue.join();

        assert_eq!(b.get().unwrap(), "B");
        assert_eq!(c.get().unwrap(), "C");
        assert_eq!(*log.lock(), vec!["B", "C"]);
        assert!(matches!(
            queue.submit(recorder(&log, "D")),
            Err(RequestError::ShuttingDown)
        ));
    }

    #[test]
    fn exclusive_shutdown_options_fail() {
        let queue = queue();
        let res = queue.shutdown(
            ShutdownOption::QUEUE_STOP_IF_EMPTY | ShutdownOption::QUEUE_STOP_IMMEDIATELY,
        );

        assert!(matches!(res, Err(RequestError::InvalidShutdownOptions(_))));
        assert!(queue.submit(task_fn(|| Ok(()))).is_ok());
    }
}
