//! Demultiplexing of gateway dispatch events onto handler threads.
//!
//! Payloads read from the gateway are pushed onto a [`DispatchEventQueue`],
//! and then consumed by an [`EventProcessor`]. Two strategies are offered:
//!
//!  * [`SingleThreadProcessor`]: every event is handled by one background
//!  thread, in arrival order.
//!  * [`MultiThreadProcessor`]: a fixed pool of threads, where events for the
//!  same guild are always handled in arrival order, but events for different
//!  guilds may be handled concurrently.
//!
//! Both consult a [`GuildReadinessGate`], deferring guild-scoped events until
//! every guild listed in `READY` has been created.

mod gate;
mod multi;
mod queue;
mod single;

pub use self::{gate::*, multi::*, queue::*, single::*};

use crate::{model::ReceivedPayload, Config, ProcessorMode};
use std::{
    collections::VecDeque,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};
use tracing::{error, trace};

/// Receives every dispatch payload once it is cleared for handling.
///
/// Implementations are called from processor threads: under the
/// multi-threaded processor, concurrently.
pub trait DispatchHandler: Send + Sync + 'static {
    /// Handles one dispatch payload.
    fn handle(&self, payload: &ReceivedPayload);
}

impl<F> DispatchHandler for F
where
    F: Fn(&ReceivedPayload) + Send + Sync + 'static,
{
    fn handle(&self, payload: &ReceivedPayload) {
        self(payload)
    }
}

/// A strategy for draining a [`DispatchEventQueue`].
pub trait EventProcessor: Send + Sync {
    /// Called after a payload is pushed onto the queue: takes every waiting
    /// payload and either schedules or postpones it.
    fn on_next(&self);

    /// Schedules every postponed payload, in arrival order.
    ///
    /// Processors call this themselves when the readiness gate opens. Does
    /// nothing if the gate is closed by the time the backlog is locked.
    fn flush_postponed(&self);

    /// Stops all processor threads. Payloads not yet handled are dropped.
    fn shutdown(&self);
}

/// Runs the handler for one payload, then informs the gate if a guild was
/// created or deleted.
#[derive(Clone)]
pub(crate) struct HandlerContext {
    handler: Arc<dyn DispatchHandler>,
    gate: Arc<GuildReadinessGate>,
}

impl HandlerContext {
    pub(crate) fn new(handler: Arc<dyn DispatchHandler>, gate: Arc<GuildReadinessGate>) -> Self {
        Self { handler, gate }
    }

    pub(crate) fn run(&self, payload: &ReceivedPayload) {
        trace!("Handling {:?} (guild {:?}).", payload.event_type(), payload.guild_id());

        if catch_unwind(AssertUnwindSafe(|| self.handler.handle(payload))).is_err() {
            error!("Dispatch handler panicked on {:?}.", payload.event_type());
        }

        if payload.is_guild_lifecycle() {
            if let Some(guild) = payload.guild_id() {
                self.gate.mark_received(guild);
            }
        }
    }
}

/// Payloads held back while the readiness gate is closed.
#[derive(Debug, Default)]
pub(crate) struct Backlog {
    postponed: VecDeque<ReceivedPayload>,
}

impl Backlog {
    /// Decides whether `payload` may run now, returning everything which is
    /// cleared for handling in the order it must be scheduled.
    pub(crate) fn admit(&mut self, payload: ReceivedPayload, ready: bool) -> Vec<ReceivedPayload> {
        if ready {
            let mut out: Vec<_> = self.postponed.drain(..).collect();
            out.push(payload);
            out
        } else if is_gated(&payload) {
            trace!("Postponing {:?} for guild {:?}.", payload.event_type(), payload.guild_id());
            self.postponed.push_back(payload);
            vec![]
        } else {
            vec![payload]
        }
    }

    pub(crate) fn release(&mut self) -> Vec<ReceivedPayload> {
        self.postponed.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.postponed.len()
    }
}

/// Guild-scoped events other than guild creation/deletion wait for the gate.
fn is_gated(payload: &ReceivedPayload) -> bool {
    payload.guild_id().is_some() && !payload.is_guild_lifecycle()
}

/// Owns the dispatch queue, readiness gate, and chosen processor.
pub struct Dispatcher {
    queue: Arc<DispatchEventQueue>,
    gate: Arc<GuildReadinessGate>,
    processor: Arc<dyn EventProcessor>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queue", &self.queue)
            .field("gate", &self.gate)
            .finish()
    }
}

impl Dispatcher {
    /// Starts a processor of the kind selected in `config`.
    pub fn new(config: &Config, handler: Arc<dyn DispatchHandler>) -> Self {
        let queue = Arc::new(DispatchEventQueue::new());
        let gate = Arc::new(GuildReadinessGate::new());
        let ctx = HandlerContext::new(handler, gate.clone());

        let processor: Arc<dyn EventProcessor> = match config.processor {
            ProcessorMode::SingleThread => SingleThreadProcessor::start(queue.clone(), ctx),
            ProcessorMode::MultiThread(workers) => MultiThreadProcessor::start(
                queue.clone(),
                ctx,
                workers.get(),
                config.dispatch_batch_limit,
            ),
        };

        Self {
            queue,
            gate,
            processor,
        }
    }

    /// Queues a payload received from the gateway, and wakes the processor.
    pub fn push(&self, payload: ReceivedPayload) {
        self.queue.push(payload);
        self.processor.on_next();
    }

    /// Returns the readiness gate consulted before dispatch.
    pub fn gate(&self) -> &Arc<GuildReadinessGate> {
        &self.gate
    }

    /// Returns the queue of payloads yet to be processed.
    pub fn queue(&self) -> &Arc<DispatchEventQueue> {
        &self.queue
    }

    /// Stops the processor's threads.
    pub fn shutdown(&self) {
        self.processor.shutdown();
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.processor.shutdown();
    }
}

/// Registers a gate hook which flushes `processor`'s backlog, without the
/// gate keeping the processor alive.
pub(crate) fn flush_on_ready<P: EventProcessor + 'static>(
    gate: &GuildReadinessGate,
    processor: &Arc<P>,
) {
    let weak = Arc::downgrade(processor);
    gate.add_ready_hook(move || {
        if let Some(processor) = weak.upgrade() {
            processor.flush_postponed();
        }
    });
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::{
        id::GuildId,
        model::{event_name, GatewayPayload},
    };
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::{Duration, Instant};

    pub(crate) fn guild_create(seq: u64, guild: u64) -> ReceivedPayload {
        ReceivedPayload::new(GatewayPayload::dispatch(
            event_name::GUILD_CREATE,
            seq,
            json!({ "id": guild.to_string(), "name": "test" }),
        ))
    }

    pub(crate) fn message(seq: u64, guild: Option<u64>) -> ReceivedPayload {
        let mut data = json!({
            "id": seq.to_string(),
            "channel_id": "1",
            "author": {"id": "1", "username": "someone"},
        });
        if let Some(guild) = guild {
            data["guild_id"] = json!(guild.to_string());
        }

        ReceivedPayload::new(GatewayPayload::dispatch(
            event_name::MESSAGE_CREATE,
            seq,
            data,
        ))
    }

    /// Records `(event, guild, seq)` for each handled payload.
    pub(crate) type Log = Arc<Mutex<Vec<(String, Option<GuildId>, u64)>>>;

    pub(crate) fn recording_handler(log: &Log) -> Arc<dyn DispatchHandler> {
        let log = log.clone();
        Arc::new(move |p: &ReceivedPayload| {
            log.lock().push((
                p.event_type().unwrap_or_default().to_string(),
                p.guild_id(),
                p.payload().sequence().unwrap_or_default(),
            ));
        })
    }

    pub(crate) fn position(log: &Log, seq: u64) -> Option<usize> {
        log.lock().iter().position(|(_, _, s)| *s == seq)
    }

    /// Polls until `log` holds at least `len` entries, or five seconds pass.
    pub(crate) fn wait_for_len(log: &Log, len: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while log.lock().len() < len {
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        true
    }
}

#[cfg(test)]
mod test {
    use super::{test_util::*, *};
    use crate::id::GuildId;

    #[test]
    fn backlog_defers_guild_events_until_ready() {
        let mut backlog = Backlog::default();

        assert!(backlog.admit(message(1, Some(1)), false).is_empty());
        assert_eq!(backlog.admit(guild_create(2, 1), false).len(), 1);
        assert_eq!(backlog.admit(message(3, None), false).len(), 1);
        assert!(backlog.admit(message(4, Some(2)), false).is_empty());
        assert_eq!(backlog.len(), 2);

        let out: Vec<_> = backlog
            .admit(message(5, Some(1)), true)
            .iter()
            .filter_map(|p| p.payload().sequence())
            .collect();
        assert_eq!(out, vec![1, 4, 5]);
        assert_eq!(backlog.len(), 0);
    }

    #[test]
    fn handler_context_marks_lifecycle_events() {
        let gate = Arc::new(GuildReadinessGate::new());
        gate.expect_guilds(vec![GuildId(1)]);

        let ctx = HandlerContext::new(Arc::new(|_: &ReceivedPayload| panic!("bad handler")), gate.clone());
        ctx.run(&message(1, Some(1)));
        assert!(!gate.all_guilds_received());

        ctx.run(&guild_create(2, 1));
        assert!(gate.all_guilds_received());
    }
}
