use super::{event_name, DecodeError};
use crate::id::GuildId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Sentinel stored in [`GatewayPayload::sequence`] when no sequence was sent.
pub const NO_SEQUENCE: i64 = -1;

/// Gateway operation codes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum OpCode {
    /// An event was dispatched (receive).
    Dispatch,
    /// Keepalive, or a server request for an immediate keepalive (send/receive).
    Heartbeat,
    /// Starts a new session during the initial handshake (send).
    Identify,
    /// Updates the client's presence (send).
    PresenceUpdate,
    /// Joins, moves, or leaves voice channels (send).
    VoiceStateUpdate,
    /// Resumes a previous session that was disconnected (send).
    Resume,
    /// The client should reconnect and resume immediately (receive).
    Reconnect,
    /// Requests information about offline guild members (send).
    RequestGuildMembers,
    /// The session has been invalidated (receive).
    InvalidSession,
    /// Sent immediately after connecting, contains the heartbeat interval (receive).
    Hello,
    /// Acknowledges a received heartbeat (receive).
    HeartbeatAck,
    /// An opcode this library does not know about.
    Unknown(u8),
}

impl OpCode {
    /// Maps a raw opcode onto its named variant.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => Self::Unknown(other),
        }
    }

    /// Returns the raw value of this opcode.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::PresenceUpdate => 3,
            Self::VoiceStateUpdate => 4,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::RequestGuildMembers => 8,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
            Self::Unknown(other) => other,
        }
    }
}

impl Display for OpCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:?} ({})", self, self.as_u8())
    }
}

#[derive(Deserialize, Serialize)]
struct RawPayload {
    op: u8,
    #[serde(default)]
    d: Option<Value>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// A single frame sent or received over the gateway.
///
/// Payloads are immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayPayload {
    opcode: OpCode,
    data: Option<Value>,
    sequence: i64,
    event_type: Option<String>,
}

impl GatewayPayload {
    /// Builds an outbound payload (no sequence, no event type).
    pub fn new(opcode: OpCode, data: Option<Value>) -> Self {
        Self {
            opcode,
            data,
            sequence: NO_SEQUENCE,
            event_type: None,
        }
    }

    /// Builds a dispatch payload, as the gateway would send it.
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            opcode: OpCode::Dispatch,
            data: Some(data),
            sequence: sequence as i64,
            event_type: Some(event_type.into()),
        }
    }

    /// Decodes a payload from gateway JSON text.
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        let raw: RawPayload = serde_json::from_str(text)?;
        let opcode = OpCode::from_u8(raw.op);

        let event_type = match opcode {
            OpCode::Dispatch => Some(raw.t.ok_or(DecodeError::MissingField("t"))?),
            _ => None,
        };

        Ok(Self {
            opcode,
            data: raw.d.filter(|d| !d.is_null()),
            sequence: raw.s.map_or(NO_SEQUENCE, |s| s as i64),
            event_type,
        })
    }

    /// Encodes this payload as gateway JSON text.
    pub fn to_json(&self) -> Result<String, DecodeError> {
        let raw = RawPayload {
            op: self.opcode.as_u8(),
            d: Some(self.data.clone().unwrap_or(Value::Null)),
            s: self.sequence(),
            t: self.event_type.clone(),
        };

        Ok(serde_json::to_string(&raw)?)
    }

    /// Returns this payload's opcode.
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Returns the (optional) inner data of this payload.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Returns the sequence number attached to this payload, if any.
    pub fn sequence(&self) -> Option<u64> {
        (self.sequence != NO_SEQUENCE).then(|| self.sequence as u64)
    }

    /// Returns the raw sequence field, where [`NO_SEQUENCE`] marks absence.
    pub fn raw_sequence(&self) -> i64 {
        self.sequence
    }

    /// Returns the event name of a dispatch payload.
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }
}

/// A dispatch payload as pulled off the socket, tagged with the guild it
/// should be routed by.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedPayload {
    payload: GatewayPayload,
    guild_id: Option<GuildId>,
}

impl ReceivedPayload {
    /// Wraps a payload, extracting its routing guild.
    ///
    /// Guild lifecycle events carry the guild under `id`, while all other
    /// guild-scoped events use `guild_id`.
    pub fn new(payload: GatewayPayload) -> Self {
        let key = match payload.event_type() {
            Some(event_name::GUILD_CREATE | event_name::GUILD_UPDATE | event_name::GUILD_DELETE) =>
                "id",
            _ => "guild_id",
        };

        let guild_id = payload
            .data()
            .and_then(|d| d.get(key))
            .and_then(|v| serde_json::from_value::<GuildId>(v.clone()).ok());

        Self { payload, guild_id }
    }

    /// Wraps a payload with an explicit routing guild.
    pub fn with_guild(payload: GatewayPayload, guild_id: Option<GuildId>) -> Self {
        Self { payload, guild_id }
    }

    /// Returns the wrapped payload.
    pub fn payload(&self) -> &GatewayPayload {
        &self.payload
    }

    /// Unwraps the inner payload.
    pub fn into_payload(self) -> GatewayPayload {
        self.payload
    }

    /// Returns the guild this payload is routed by, if any.
    pub fn guild_id(&self) -> Option<GuildId> {
        self.guild_id
    }

    /// Returns the dispatch event name, if any.
    pub fn event_type(&self) -> Option<&str> {
        self.payload.event_type()
    }

    /// Whether this payload creates or removes a guild. These are never held
    /// back by readiness gating, as they are what makes a guild ready.
    pub fn is_guild_lifecycle(&self) -> bool {
        matches!(
            self.event_type(),
            Some(event_name::GUILD_CREATE | event_name::GUILD_DELETE)
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_sequence_uses_sentinel() {
        let payload = GatewayPayload::from_json(r#"{"op":11}"#).unwrap();

        assert_eq!(payload.opcode(), OpCode::HeartbeatAck);
        assert_eq!(payload.raw_sequence(), NO_SEQUENCE);
        assert_eq!(payload.sequence(), None);
        assert_eq!(payload.data(), None);
    }

    #[test]
    fn dispatch_requires_event_type() {
        assert!(GatewayPayload::from_json(r#"{"op":0,"d":{},"s":3}"#).is_err());

        let payload = GatewayPayload::from_json(r#"{"op":0,"d":{},"s":3,"t":"READY"}"#).unwrap();
        assert_eq!(payload.event_type(), Some("READY"));
        assert_eq!(payload.sequence(), Some(3));
    }

    #[test]
    fn event_type_dropped_for_non_dispatch() {
        let payload =
            GatewayPayload::from_json(r#"{"op":10,"d":{"heartbeat_interval":41250},"t":"X"}"#)
                .unwrap();

        assert_eq!(payload.opcode(), OpCode::Hello);
        assert_eq!(payload.event_type(), None);
    }

    #[test]
    fn unknown_opcodes_survive_decoding() {
        let payload = GatewayPayload::from_json(r#"{"op":42}"#).unwrap();
        assert_eq!(payload.opcode(), OpCode::Unknown(42));
        assert_eq!(payload.opcode().as_u8(), 42);
    }

    #[test]
    fn heartbeat_encodes_null_data() {
        let text = GatewayPayload::new(OpCode::Heartbeat, None).to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["op"], 1);
        assert!(value["d"].is_null());
    }

    #[test]
    fn routing_guild_is_extracted() {
        let create = ReceivedPayload::new(GatewayPayload::dispatch(
            event_name::GUILD_CREATE,
            1,
            json!({"id": "10", "name": "a"}),
        ));
        let message = ReceivedPayload::new(GatewayPayload::dispatch(
            event_name::MESSAGE_CREATE,
            2,
            json!({"id": "99", "guild_id": "10", "channel_id": "5"}),
        ));
        let dm = ReceivedPayload::new(GatewayPayload::dispatch(
            event_name::MESSAGE_CREATE,
            3,
            json!({"id": "98", "channel_id": "6"}),
        ));

        assert_eq!(create.guild_id(), Some(GuildId(10)));
        assert!(create.is_guild_lifecycle());
        assert_eq!(message.guild_id(), Some(GuildId(10)));
        assert!(!message.is_guild_lifecycle());
        assert_eq!(dm.guild_id(), None);
    }
}
