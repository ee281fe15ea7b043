use super::{flush_on_ready, Backlog, DispatchEventQueue, EventProcessor, HandlerContext};
use crate::model::ReceivedPayload;
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::{fmt, sync::Arc, thread};
use tracing::{instrument, trace, warn};

pub(crate) enum ExecutorMessage {
    Handle(ReceivedPayload),
    Poison,
}

/// Handles every dispatch event on one background thread, in arrival order.
pub struct SingleThreadProcessor {
    queue: Arc<DispatchEventQueue>,
    ctx: HandlerContext,
    backlog: Mutex<Backlog>,
    tx: Sender<ExecutorMessage>,
}

impl fmt::Debug for SingleThreadProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleThreadProcessor")
            .field("postponed", &self.backlog.lock().len())
            .field("scheduled", &self.tx.len())
            .finish()
    }
}

impl SingleThreadProcessor {
    pub(crate) fn start(queue: Arc<DispatchEventQueue>, ctx: HandlerContext) -> Arc<Self> {
        let (tx, rx) = flume::unbounded();

        let runner_ctx = ctx.clone();
        let spawned = thread::Builder::new()
            .name("courier-dispatch".into())
            .spawn(move || {
                trace!("Dispatch executor started.");
                runner(runner_ctx, rx);
                trace!("Dispatch executor finished.");
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn dispatch executor: {}", e);
        }

        let processor = Arc::new(Self {
            queue,
            ctx,
            backlog: Mutex::default(),
            tx,
        });
        flush_on_ready(&processor.ctx.gate, &processor);

        processor
    }

    fn schedule(&self, payloads: Vec<ReceivedPayload>) {
        for payload in payloads {
            // Executor may be gone after shutdown: this is fine.
            let _ = self.tx.send(ExecutorMessage::Handle(payload));
        }
    }
}

impl EventProcessor for SingleThreadProcessor {
    fn on_next(&self) {
        let mut backlog = self.backlog.lock();
        while let Some(payload) = self.queue.pull() {
            let ready = self.ctx.gate.all_guilds_received();
            let cleared = backlog.admit(payload, ready);
            self.schedule(cleared);
        }
    }

    fn flush_postponed(&self) {
        let mut backlog = self.backlog.lock();
        // A fresh READY may have closed the gate again since the hook fired.
        if !self.ctx.gate.all_guilds_received() {
            return;
        }

        let cleared = backlog.release();
        self.schedule(cleared);
    }

    fn shutdown(&self) {
        let _ = self.tx.send(ExecutorMessage::Poison);
    }
}

#[instrument(skip(ctx, rx))]
fn runner(ctx: HandlerContext, rx: Receiver<ExecutorMessage>) {
    while let Ok(ExecutorMessage::Handle(payload)) = rx.recv() {
        ctx.run(&payload);
    }
}
