use super::{flush_on_ready, Backlog, DispatchEventQueue, EventProcessor, HandlerContext};
use crate::{id::GuildId, model::ReceivedPayload};
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};
use tracing::{debug, instrument, trace, warn};

/// Events with no guild share one sub-queue.
type QueueKey = Option<GuildId>;

#[derive(Default)]
struct SubQueue {
    items: VecDeque<ReceivedPayload>,
    /// Set while the key is in the pending channel or owned by a worker.
    scheduled: bool,
}

enum WorkerMessage {
    Drain(QueueKey),
    Poison,
}

#[derive(Default)]
struct State {
    backlog: Backlog,
    queues: HashMap<QueueKey, SubQueue>,
}

struct Shared {
    ctx: HandlerContext,
    state: Mutex<State>,
    pending: Sender<WorkerMessage>,
    running: AtomicBool,
    batch_limit: usize,
}

/// Handles dispatch events on a fixed pool of threads.
///
/// Each guild's events live in their own FIFO sub-queue, and a sub-queue is
/// drained by at most one worker at a time: events for one guild are handled
/// in order, while different guilds proceed in parallel. Events without a
/// guild share a single sub-queue.
///
/// A worker which has handled a batch of events from one sub-queue while
/// others are waiting hands it back to the pool, so a busy guild cannot
/// starve the rest.
pub struct MultiThreadProcessor {
    queue: Arc<DispatchEventQueue>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for MultiThreadProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("MultiThreadProcessor")
            .field("postponed", &state.backlog.len())
            .field("sub_queues", &state.queues.len())
            .field("workers", &self.workers.lock().len())
            .field("running", &self.shared.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl MultiThreadProcessor {
    pub(crate) fn start(
        queue: Arc<DispatchEventQueue>,
        ctx: HandlerContext,
        workers: usize,
        batch_limit: usize,
    ) -> Arc<Self> {
        let (tx, rx) = flume::unbounded();
        let shared = Arc::new(Shared {
            ctx,
            state: Mutex::default(),
            pending: tx,
            running: AtomicBool::new(true),
            batch_limit: batch_limit.max(1),
        });

        let handles = (0..workers.max(1))
            .filter_map(|i| {
                let shared = shared.clone();
                let rx = rx.clone();
                thread::Builder::new()
                    .name(format!("courier-dispatch-{}", i))
                    .spawn(move || {
                        trace!("Dispatch worker {} started.", i);
                        runner(&shared, &rx);
                        trace!("Dispatch worker {} finished.", i);
                    })
                    .map_err(|e| warn!("Failed to spawn dispatch worker {}: {}", i, e))
                    .ok()
            })
            .collect();

        let processor = Arc::new(Self {
            queue,
            shared,
            workers: Mutex::new(handles),
        });
        flush_on_ready(&processor.shared.ctx.gate, &processor);

        processor
    }

    /// Blocks until every worker thread has exited.
    ///
    /// Only returns once [`shutdown`] has been called.
    ///
    /// [`shutdown`]: EventProcessor::shutdown
    pub fn join(&self) {
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if handle.join().is_err() {
                warn!("Dispatch worker panicked.");
            }
        }
    }
}

impl Shared {
    fn route(&self, state: &mut State, payloads: Vec<ReceivedPayload>) {
        for payload in payloads {
            let key = payload.guild_id();
            let sub = state.queues.entry(key).or_default();
            sub.items.push_back(payload);

            if !sub.scheduled {
                sub.scheduled = true;
                let _ = self.pending.send(WorkerMessage::Drain(key));
            }
        }
    }

    fn drain(&self, key: QueueKey, rx: &Receiver<WorkerMessage>) {
        let mut handled = 0;

        loop {
            let next = {
                let mut state = self.state.lock();
                let sub = match state.queues.get_mut(&key) {
                    Some(sub) => sub,
                    None => return,
                };

                match sub.items.pop_front() {
                    Some(payload) => payload,
                    None => {
                        state.queues.remove(&key);
                        return;
                    },
                }
            };

            self.ctx.run(&next);
            handled += 1;

            if !self.running.load(Ordering::Acquire) {
                return;
            }

            if handled >= self.batch_limit && !rx.is_empty() {
                let mut state = self.state.lock();
                match state.queues.get(&key) {
                    Some(sub) if !sub.items.is_empty() => {
                        trace!("Yielding sub-queue {:?} after {} events.", key, handled);
                        let _ = self.pending.send(WorkerMessage::Drain(key));
                    },
                    _ => {
                        state.queues.remove(&key);
                    },
                }
                return;
            }
        }
    }
}

impl EventProcessor for MultiThreadProcessor {
    fn on_next(&self) {
        if !self.shared.running.load(Ordering::Acquire) {
            return;
        }

        let mut state = self.shared.state.lock();
        while let Some(payload) = self.queue.pull() {
            let ready = self.shared.ctx.gate.all_guilds_received();
            let cleared = state.backlog.admit(payload, ready);
            self.shared.route(&mut state, cleared);
        }
    }

    fn flush_postponed(&self) {
        let mut state = self.shared.state.lock();
        if !self.shared.ctx.gate.all_guilds_received() {
            trace!("Gate closed again, keeping postponed events.");
            return;
        }

        let cleared = state.backlog.release();
        debug!("Releasing {} postponed events.", cleared.len());
        self.shared.route(&mut state, cleared);
    }

    fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }

        for _ in 0..self.workers.lock().len() {
            let _ = self.shared.pending.send(WorkerMessage::Poison);
        }
    }
}

#[instrument(skip(shared, rx))]
fn runner(shared: &Shared, rx: &Receiver<WorkerMessage>) {
    while let Ok(WorkerMessage::Drain(key)) = rx.recv() {
        if !shared.running.load(Ordering::Acquire) {
            break;
        }

        shared.drain(key, rx);
    }
}
