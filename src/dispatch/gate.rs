use crate::{awaiter::EventAwaiter, id::GuildId};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::HashSet,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};
use tracing::{debug, error, trace};

type ReadyHook = Box<dyn Fn() + Send + Sync>;

/// Tracks which guilds announced by `READY` have yet to be created.
///
/// Until every such guild has had its `GUILD_CREATE` (or `GUILD_DELETE`)
/// handled, processors hold back other guild-scoped events so that handlers
/// never observe a guild before it exists.
pub struct GuildReadinessGate {
    awaiting: Mutex<HashSet<GuildId>>,
    hooks: RwLock<Vec<ReadyHook>>,
    awaiter: Arc<EventAwaiter>,
}

impl fmt::Debug for GuildReadinessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuildReadinessGate")
            .field("awaiting", &*self.awaiting.lock())
            .field("hooks", &self.hooks.read().len())
            .finish()
    }
}

impl Default for GuildReadinessGate {
    fn default() -> Self {
        let awaiter = Arc::new(EventAwaiter::new());
        awaiter.trigger();

        Self {
            awaiting: Mutex::default(),
            hooks: RwLock::default(),
            awaiter,
        }
    }
}

impl GuildReadinessGate {
    /// Creates a gate with no guilds outstanding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the set of outstanding guilds with those listed in a fresh
    /// `READY` payload.
    pub fn expect_guilds(&self, guilds: impl IntoIterator<Item = GuildId>) {
        let mut awaiting = self.awaiting.lock();
        awaiting.clear();
        awaiting.extend(guilds);

        debug!("Awaiting {} guilds.", awaiting.len());

        if awaiting.is_empty() {
            self.awaiter.trigger();
            drop(awaiting);
            self.run_hooks();
        } else {
            self.awaiter.reset();
        }
    }

    /// Records that a guild's creation (or deletion) has been handled.
    pub fn mark_received(&self, guild: GuildId) {
        let mut awaiting = self.awaiting.lock();
        if !awaiting.remove(&guild) {
            return;
        }

        trace!("Guild {} received, {} remaining.", guild, awaiting.len());

        if awaiting.is_empty() {
            self.awaiter.trigger();
            drop(awaiting);
            self.run_hooks();
        }
    }

    /// Returns `true` iff no guild is still awaited.
    pub fn all_guilds_received(&self) -> bool {
        self.awaiting.lock().is_empty()
    }

    /// Returns whether `guild` is still awaited.
    pub fn is_awaiting(&self, guild: GuildId) -> bool {
        self.awaiting.lock().contains(&guild)
    }

    /// Registers a callback run each time the last outstanding guild arrives.
    ///
    /// Hooks are run on the thread which handled that guild, outside of any
    /// lock held by the gate.
    pub fn add_ready_hook<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.write().push(Box::new(hook));
    }

    /// Returns a signal which is triggered while every guild is present.
    pub fn awaiter(&self) -> Arc<EventAwaiter> {
        self.awaiter.clone()
    }

    /// The awaiter must already be triggered, under the `awaiting` lock, so
    /// that a later `expect_guilds` always wins.
    fn run_hooks(&self) {
        debug!("All guilds received.");

        for hook in self.hooks.read().iter() {
            if catch_unwind(AssertUnwindSafe(hook)).is_err() {
                error!("Guild readiness hook panicked.");
            }
        }
    }
}
