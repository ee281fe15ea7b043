//! Connection to Discord's real-time gateway.
//!
//! A [`Gateway`] owns a single background task which holds the WebSocket,
//! drives heartbeating, and resumes or re-identifies after disconnects.
//! Dispatch payloads read from the socket are handed to a [`Dispatcher`],
//! while connectivity changes are announced through an [`EventTransmitter`].
//!
//! [`Dispatcher`]: crate::dispatch::Dispatcher
//! [`EventTransmitter`]: crate::events::EventTransmitter

pub mod retry;
mod runner;
mod session;
pub(crate) mod ws;

pub use self::session::*;

use self::runner::Runner;
use crate::{
    dispatch::Dispatcher,
    error::{GatewayError, GatewayResult},
    events::EventTransmitter,
    id::GuildId,
    model::{GatewayPayload, OpCode},
    Config,
};
use flume::Sender;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::debug;
use url::Url;

/// Messages accepted by a running gateway task.
#[derive(Debug)]
pub(crate) enum GatewayCommand {
    Send(GatewayPayload),
    Shutdown,
}

/// Snapshot of the session, refreshed by the gateway task.
#[derive(Clone, Debug, Default)]
pub(crate) struct GatewayStatus {
    pub(crate) state: SessionState,
    pub(crate) latency: Option<Duration>,
    pub(crate) session_id: Option<String>,
}

/// Handle to a running gateway session.
///
/// Dropping this handle does not stop the session; call [`shutdown`].
///
/// [`shutdown`]: Gateway::shutdown
#[derive(Debug)]
pub struct Gateway {
    tx: Sender<GatewayCommand>,
    status: Arc<Mutex<GatewayStatus>>,
    task: Mutex<Option<JoinHandle<GatewayResult<()>>>>,
}

impl Gateway {
    /// Spawns the gateway task onto `handle`, and begins connecting.
    pub fn start(
        config: &Config,
        dispatcher: Arc<Dispatcher>,
        transmitter: Arc<EventTransmitter>,
        handle: &Handle,
    ) -> GatewayResult<Self> {
        let url = Url::parse(&config.gateway_url)?;
        let session = Session::new(Identity {
            token: config.token.clone(),
            intents: config.intents,
            shard: config.shard,
        });

        let (tx, rx) = flume::unbounded();
        let status = Arc::new(Mutex::new(GatewayStatus::default()));

        let runner = Runner::new(
            url,
            config.gateway_retry,
            session,
            dispatcher,
            transmitter,
            rx,
            status.clone(),
        );
        let task = handle.spawn(runner.run());

        Ok(Self {
            tx,
            status,
            task: Mutex::new(Some(task)),
        })
    }

    /// Queues a raw payload to be sent once the session is established.
    pub fn send(&self, payload: GatewayPayload) -> GatewayResult<()> {
        self.tx
            .send(GatewayCommand::Send(payload))
            .map_err(|_| GatewayError::Closed)
    }

    /// Updates the bot's presence, e.g. its status and activity.
    ///
    /// `presence` is sent as the `d` field of a `PRESENCE_UPDATE`, and must
    /// follow Discord's presence schema.
    pub fn update_presence(&self, presence: Value) -> GatewayResult<()> {
        self.send(GatewayPayload::new(OpCode::PresenceUpdate, Some(presence)))
    }

    /// Asks Discord for the members of a guild, whose names begin with `query`.
    ///
    /// Results arrive as `GUILD_MEMBERS_CHUNK` dispatches.
    pub fn request_guild_members(&self, guild_id: GuildId, query: &str, limit: u32) -> GatewayResult<()> {
        self.send(GatewayPayload::new(
            OpCode::RequestGuildMembers,
            Some(json!({
                "guild_id": guild_id,
                "query": query,
                "limit": limit,
            })),
        ))
    }

    /// Closes the connection and stops reconnecting.
    pub fn shutdown(&self) {
        debug!("Gateway shutdown requested.");
        let _ = self.tx.send(GatewayCommand::Shutdown);
    }

    /// Waits for the gateway task to finish.
    ///
    /// Returns an error if the session ended for any reason other than
    /// [`shutdown`], such as a fatal close code.
    ///
    /// [`shutdown`]: Gateway::shutdown
    pub async fn wait(&self) -> GatewayResult<()> {
        let task = self.task.lock().take();

        match task {
            Some(task) => task.await.map_err(|_| GatewayError::TaskFailed)?,
            None => Ok(()),
        }
    }

    /// Returns the current state of the session.
    pub fn state(&self) -> SessionState {
        self.status.lock().state
    }

    /// Returns the round-trip time of the last acknowledged heartbeat.
    pub fn latency(&self) -> Option<Duration> {
        self.status.lock().latency
    }

    /// Returns the session id given by the last `READY`.
    pub fn session_id(&self) -> Option<String> {
        self.status.lock().session_id.clone()
    }
}
