use crate::{
    id::GuildId,
    model::{
        event_name,
        ClosePolicy,
        DecodeError,
        FromData,
        GatewayCloseStatusCode,
        GatewayIntents,
        GatewayPayload,
        OpCode,
        UnavailableGuild,
    },
};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Consecutive failed resumes after which a fresh identify is used.
pub const MAX_RESUME_FAILURES: u8 = 2;

/// Connection state of a gateway session.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum SessionState {
    /// No socket is open.
    #[default]
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// `IDENTIFY` has been sent, awaiting `READY`.
    Identifying,
    /// `RESUME` has been sent, awaiting `RESUMED`.
    Resuming,
    /// The session is live.
    Connected,
    /// The socket was lost, and will be reopened.
    Reconnecting,
    /// Discord refused the session. It will not be retried.
    Fatal,
}

/// Outcome of a heartbeat timer firing.
#[derive(Debug)]
pub enum HeartbeatTick {
    /// Send this heartbeat.
    Send(GatewayPayload),
    /// The previous heartbeat was never acknowledged: the connection is dead.
    Zombied,
}

/// What to do after the socket has closed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloseAction {
    /// Reconnect, then send `RESUME`.
    Resume,
    /// Reconnect, then send `IDENTIFY`.
    Reidentify,
    /// Stop permanently.
    Fatal(GatewayCloseStatusCode),
}

/// Dispatches which change the session itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionUpdate {
    /// `READY` was received, listing these guilds.
    Ready(Vec<GuildId>),
    /// `RESUMED` was received.
    Resumed,
}

/// Subset of `READY` needed to manage the session.
#[derive(Deserialize)]
struct ReadySession {
    session_id: String,
    #[serde(default)]
    resume_gateway_url: Option<String>,
    #[serde(default)]
    guilds: Vec<UnavailableGuild>,
}

/// Credentials and options sent with `IDENTIFY`.
#[derive(Clone, Debug)]
pub struct Identity {
    /// Bot token, without the `Bot ` prefix.
    pub token: String,
    /// Events this session subscribes to.
    pub intents: GatewayIntents,
    /// `[shard_id, shard_count]`, if sharding.
    pub shard: Option<[u32; 2]>,
}

/// Protocol state of one gateway session, independent of any socket.
///
/// The runner feeds received payloads and socket events into this, and acts
/// on what it returns.
#[derive(Debug)]
pub struct Session {
    identity: Identity,
    state: SessionState,

    session_id: Option<String>,
    resume_url: Option<String>,
    sequence: Option<u64>,
    resumable: bool,
    resume_failures: u8,

    heartbeat_interval: Option<Duration>,
    awaiting_ack: bool,
    last_heartbeat: Option<Instant>,
    latency: Option<Duration>,
}

impl Session {
    /// Creates a disconnected session which will identify as `identity`.
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            state: SessionState::Disconnected,

            session_id: None,
            resume_url: None,
            sequence: None,
            resumable: false,
            resume_failures: 0,

            heartbeat_interval: None,
            awaiting_ack: false,
            last_heartbeat: None,
            latency: None,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// ID of the current session, once `READY` has been received.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// URL which a `RESUME` should connect to, if `READY` supplied one.
    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }

    /// Last sequence number received.
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Round-trip time of the last acknowledged heartbeat.
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    /// Interval given by the last `HELLO`.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    /// Consecutive failed `RESUME` attempts.
    pub fn resume_failures(&self) -> u8 {
        self.resume_failures
    }

    /// Whether the next handshake will be a `RESUME`.
    pub fn can_resume(&self) -> bool {
        self.resumable
            && self.session_id.is_some()
            && self.sequence.is_some()
            && self.resume_failures < MAX_RESUME_FAILURES
    }

    /// Marks the start of a connection attempt.
    pub fn connecting(&mut self) {
        self.state = SessionState::Connecting;
        self.awaiting_ack = false;
        self.last_heartbeat = None;
    }

    /// Handles `HELLO`, returning the handshake to send.
    pub fn on_hello(&mut self, interval: Duration) -> GatewayPayload {
        self.heartbeat_interval = Some(interval);
        self.awaiting_ack = false;

        if self.can_resume() {
            self.state = SessionState::Resuming;
            self.resume_payload()
        } else {
            if self.resume_failures >= MAX_RESUME_FAILURES {
                debug!("Resume failed {} times, identifying.", self.resume_failures);
            }
            self.clear_session();
            self.state = SessionState::Identifying;
            self.identify_payload()
        }
    }

    fn identify_payload(&self) -> GatewayPayload {
        let mut data = json!({
            "token": self.identity.token,
            "intents": self.identity.intents.bits(),
            "properties": {
                "os": std::env::consts::OS,
                "browser": "courier",
                "device": "courier",
            },
        });

        if let Some(shard) = self.identity.shard {
            data["shard"] = json!(shard);
        }

        GatewayPayload::new(OpCode::Identify, Some(data))
    }

    fn resume_payload(&self) -> GatewayPayload {
        GatewayPayload::new(
            OpCode::Resume,
            Some(json!({
                "token": self.identity.token,
                "session_id": self.session_id,
                "seq": self.sequence,
            })),
        )
    }

    /// Builds a heartbeat carrying the last sequence number.
    pub fn heartbeat_payload(&self) -> GatewayPayload {
        GatewayPayload::new(OpCode::Heartbeat, Some(json!(self.sequence)))
    }

    /// Handles the heartbeat timer.
    pub fn heartbeat_tick(&mut self) -> HeartbeatTick {
        if self.awaiting_ack {
            warn!("Heartbeat not acknowledged: connection is zombied.");
            return HeartbeatTick::Zombied;
        }

        self.awaiting_ack = true;
        self.last_heartbeat = Some(Instant::now());

        HeartbeatTick::Send(self.heartbeat_payload())
    }

    /// Handles `HEARTBEAT_ACK`.
    pub fn on_heartbeat_ack(&mut self) {
        self.awaiting_ack = false;
        self.latency = self.last_heartbeat.map(|sent| sent.elapsed());
    }

    /// Records a dispatch's sequence number, and handles dispatches which
    /// affect the session.
    pub fn on_dispatch(
        &mut self,
        payload: &GatewayPayload,
    ) -> Result<Option<SessionUpdate>, DecodeError> {
        if let Some(seq) = payload.sequence() {
            self.sequence = Some(seq);
        }

        match payload.event_type() {
            Some(event_name::READY) => {
                let data = payload
                    .data()
                    .cloned()
                    .ok_or(DecodeError::MissingField("d"))?;
                let ready = ReadySession::from_data(data)?;

                info!("Session {} ready.", ready.session_id);

                self.session_id = Some(ready.session_id);
                self.resume_url = ready.resume_gateway_url;
                self.resumable = true;
                self.resume_failures = 0;
                self.state = SessionState::Connected;

                Ok(Some(SessionUpdate::Ready(
                    ready.guilds.into_iter().map(|g| g.id).collect(),
                )))
            },
            Some(event_name::RESUMED) => {
                info!("Session resumed.");
                self.resume_failures = 0;
                self.state = SessionState::Connected;

                Ok(Some(SessionUpdate::Resumed))
            },
            _ => Ok(None),
        }
    }

    /// Handles `INVALID_SESSION`. `resumable` is the payload's `d` field.
    pub fn on_invalid_session(&mut self, resumable: bool) {
        if self.state == SessionState::Resuming {
            self.resume_failures += 1;
        }

        if !resumable {
            self.clear_session();
        }

        self.state = SessionState::Reconnecting;
    }

    /// Handles a `RECONNECT` request from Discord.
    pub fn on_reconnect_request(&mut self) {
        self.state = SessionState::Reconnecting;
    }

    /// Handles the socket closing, with the close code if one was sent.
    pub fn on_close(&mut self, code: Option<u16>) -> CloseAction {
        if self.state == SessionState::Resuming {
            self.resume_failures += 1;
        }

        let code = code.map(GatewayCloseStatusCode::from_int);
        let policy = code.map_or(ClosePolicy::Resume, GatewayCloseStatusCode::policy);

        match policy {
            ClosePolicy::Fatal => {
                self.state = SessionState::Fatal;
                self.clear_session();

                CloseAction::Fatal(code.unwrap_or(GatewayCloseStatusCode::UnknownError))
            },
            ClosePolicy::Reidentify => {
                self.state = SessionState::Reconnecting;
                self.clear_session();

                CloseAction::Reidentify
            },
            ClosePolicy::Resume => {
                self.state = SessionState::Reconnecting;

                if self.can_resume() {
                    CloseAction::Resume
                } else {
                    CloseAction::Reidentify
                }
            },
        }
    }

    /// Marks the session as closed by the user.
    pub fn on_shutdown(&mut self) {
        self.state = SessionState::Disconnected;
    }

    fn clear_session(&mut self) {
        self.session_id = None;
        self.resume_url = None;
        self.sequence = None;
        self.resumable = false;
        self.resume_failures = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::Value;

    fn session() -> Session {
        Session::new(Identity {
            token: "token".into(),
            intents: GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES,
            shard: None,
        })
    }

    fn ready(seq: u64) -> GatewayPayload {
        GatewayPayload::dispatch(
            event_name::READY,
            seq,
            json!({
                "v": 10,
                "user": {"id": "1", "username": "bot"},
                "session_id": "abc",
                "resume_gateway_url": "wss://resume.discord.gg",
                "guilds": [{"id": "1", "unavailable": true}, {"id": "2", "unavailable": true}],
            }),
        )
    }

    fn handshake_op(payload: &GatewayPayload) -> OpCode {
        payload.opcode()
    }

    fn connect_and_ready(session: &mut Session) {
        session.connecting();
        session.on_hello(Duration::from_millis(41_250));
        session.on_dispatch(&ready(1)).unwrap();
    }

    #[test]
    fn first_handshake_identifies() {
        let mut session = session();
        session.connecting();
        let hs = session.on_hello(Duration::from_secs(45));

        assert_eq!(handshake_op(&hs), OpCode::Identify);
        assert_eq!(session.state(), SessionState::Identifying);

        let data = hs.data().unwrap();
        assert_eq!(data["token"], "token");
        assert_eq!(
            data["intents"],
            Value::from((GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES).bits())
        );
    }

    #[test]
    fn ready_registers_session_and_guilds() {
        let mut session = session();
        session.connecting();
        session.on_hello(Duration::from_secs(45));

        let update = session.on_dispatch(&ready(1)).unwrap();

        assert_eq!(
            update,
            Some(SessionUpdate::Ready(vec![GuildId(1), GuildId(2)]))
        );
        assert_eq!(session.session_id(), Some("abc"));
        assert_eq!(session.resume_url(), Some("wss://resume.discord.gg"));
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.can_resume());
    }

    #[test]
    fn resumable_close_resumes() {
        let mut session = session();
        connect_and_ready(&mut session);
        session.on_dispatch(&GatewayPayload::dispatch("MESSAGE_CREATE", 7, json!({}))).unwrap();

        assert_eq!(session.on_close(Some(4000)), CloseAction::Resume);

        session.connecting();
        let hs = session.on_hello(Duration::from_secs(45));
        assert_eq!(handshake_op(&hs), OpCode::Resume);
        assert_eq!(hs.data().unwrap()["seq"], 7);
        assert_eq!(hs.data().unwrap()["session_id"], "abc");
    }

    #[test]
    fn authentication_failure_is_fatal() {
        let mut session = session();
        session.connecting();
        session.on_hello(Duration::from_secs(45));

        assert_eq!(
            session.on_close(Some(4004)),
            CloseAction::Fatal(GatewayCloseStatusCode::AuthenticationFailed)
        );
        assert_eq!(session.state(), SessionState::Fatal);
        assert!(!session.can_resume());
    }

    #[test]
    fn invalid_seq_reidentifies() {
        let mut session = session();
        connect_and_ready(&mut session);

        assert_eq!(session.on_close(Some(4007)), CloseAction::Reidentify);
        assert_eq!(session.session_id(), None);
    }

    #[test]
    fn two_failed_resumes_fall_back_to_identify() {
        let mut session = session();
        connect_and_ready(&mut session);

        for _ in 0..MAX_RESUME_FAILURES {
            assert_eq!(session.on_close(None), CloseAction::Resume);
            session.connecting();
            assert_eq!(
                handshake_op(&session.on_hello(Duration::from_secs(45))),
                OpCode::Resume
            );
        }

        assert_eq!(session.on_close(None), CloseAction::Reidentify);
        session.connecting();
        assert_eq!(
            handshake_op(&session.on_hello(Duration::from_secs(45))),
            OpCode::Identify
        );
    }

    #[test]
    fn resumed_resets_failures() {
        let mut session = session();
        connect_and_ready(&mut session);

        session.on_close(None);
        session.connecting();
        session.on_hello(Duration::from_secs(45));
        session.on_close(None);
        assert_eq!(session.resume_failures(), 1);

        session.connecting();
        session.on_hello(Duration::from_secs(45));
        let update = session
            .on_dispatch(&GatewayPayload::dispatch(event_name::RESUMED, 9, json!({})))
            .unwrap();

        assert_eq!(update, Some(SessionUpdate::Resumed));
        assert_eq!(session.resume_failures(), 0);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn missed_ack_zombies_connection() {
        let mut session = session();
        connect_and_ready(&mut session);

        match session.heartbeat_tick() {
            HeartbeatTick::Send(hb) => {
                assert_eq!(hb.opcode(), OpCode::Heartbeat);
                assert_eq!(hb.data(), Some(&json!(1)));
            },
            HeartbeatTick::Zombied => panic!("first heartbeat zombied"),
        }

        assert!(matches!(session.heartbeat_tick(), HeartbeatTick::Zombied));
    }

    #[test]
    fn ack_clears_zombie_check() {
        let mut session = session();
        connect_and_ready(&mut session);

        assert!(matches!(session.heartbeat_tick(), HeartbeatTick::Send(_)));
        session.on_heartbeat_ack();
        assert!(session.latency().is_some());
        assert!(matches!(session.heartbeat_tick(), HeartbeatTick::Send(_)));
    }

    #[test]
    fn invalid_session_clears_state_unless_resumable() {
        let mut session = session();
        connect_and_ready(&mut session);

        session.on_invalid_session(true);
        assert!(session.can_resume());

        session.on_invalid_session(false);
        assert!(!session.can_resume());
        assert_eq!(session.state(), SessionState::Reconnecting);
    }
}
