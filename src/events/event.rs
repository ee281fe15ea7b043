use super::EventIdentifier;
use crate::model::*;
use serde_json::Value;

/// A typed event, as handed to listeners.
///
/// Dispatches are decoded from their raw payload; connectivity events are
/// raised by the gateway runner itself.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Event {
    /// Fired once the gateway accepts an `IDENTIFY`.
    Ready(Box<Ready>),
    /// Fired once the gateway accepts a `RESUME`. Missed events follow.
    Resumed,
    /// A guild became available, or the bot joined one.
    GuildCreate(Box<Guild>),
    /// A guild's settings changed.
    GuildUpdate(Box<Guild>),
    /// A guild became unavailable, or the bot left it.
    GuildDelete(UnavailableGuild),
    /// A user joined a guild.
    GuildMemberAdd(Box<Member>),
    /// A member's nickname or roles changed.
    GuildMemberUpdate(Box<Member>),
    /// A user left or was removed from a guild.
    GuildMemberRemove(MemberRemove),
    /// A role was created.
    GuildRoleCreate(RoleChange),
    /// A role was edited.
    GuildRoleUpdate(RoleChange),
    /// A role was deleted.
    GuildRoleDelete(RoleDelete),
    /// A channel was created.
    ChannelCreate(Channel),
    /// A channel was edited.
    ChannelUpdate(Channel),
    /// A channel was deleted.
    ChannelDelete(Channel),
    /// A message was sent, in a guild or a DM.
    MessageCreate(Box<Message>),
    /// A message was edited.
    MessageUpdate(MessageUpdate),
    /// A message was deleted.
    MessageDelete(MessageDelete),
    /// The socket was opened and the gateway said `HELLO`.
    Connected,
    /// The socket closed or failed.
    Disconnected {
        /// Close code sent by Discord, if the socket was closed cleanly.
        code: Option<GatewayCloseStatusCode>,
        /// Whether the runner will try to connect again.
        reconnecting: bool,
    },
    /// A dispatch without a typed representation here.
    Unknown {
        /// Dispatch event name.
        name: String,
        /// Raw event data.
        data: Value,
    },
}

impl Event {
    /// Decodes the typed event for a dispatch payload.
    ///
    /// Payloads which are not dispatches are rejected.
    pub fn from_payload(payload: &ReceivedPayload) -> Result<Self, DecodeError> {
        let name = payload
            .event_type()
            .ok_or(DecodeError::MissingField("t"))?;
        let data = payload
            .payload()
            .data()
            .cloned()
            .unwrap_or(Value::Null);

        Ok(match EventIdentifier::from_event_name(name) {
            EventIdentifier::Ready => Event::Ready(FromData::from_data(data)?),
            EventIdentifier::Resumed => Event::Resumed,
            EventIdentifier::GuildCreate => Event::GuildCreate(FromData::from_data(data)?),
            EventIdentifier::GuildUpdate => Event::GuildUpdate(FromData::from_data(data)?),
            EventIdentifier::GuildDelete => Event::GuildDelete(FromData::from_data(data)?),
            EventIdentifier::GuildMemberAdd => Event::GuildMemberAdd(FromData::from_data(data)?),
            EventIdentifier::GuildMemberUpdate =>
                Event::GuildMemberUpdate(FromData::from_data(data)?),
            EventIdentifier::GuildMemberRemove =>
                Event::GuildMemberRemove(FromData::from_data(data)?),
            EventIdentifier::GuildRoleCreate => Event::GuildRoleCreate(FromData::from_data(data)?),
            EventIdentifier::GuildRoleUpdate => Event::GuildRoleUpdate(FromData::from_data(data)?),
            EventIdentifier::GuildRoleDelete => Event::GuildRoleDelete(FromData::from_data(data)?),
            EventIdentifier::ChannelCreate => Event::ChannelCreate(FromData::from_data(data)?),
            EventIdentifier::ChannelUpdate => Event::ChannelUpdate(FromData::from_data(data)?),
            EventIdentifier::ChannelDelete => Event::ChannelDelete(FromData::from_data(data)?),
            EventIdentifier::MessageCreate => Event::MessageCreate(FromData::from_data(data)?),
            EventIdentifier::MessageUpdate => Event::MessageUpdate(FromData::from_data(data)?),
            EventIdentifier::MessageDelete => Event::MessageDelete(FromData::from_data(data)?),
            _ => Event::Unknown {
                name: name.to_string(),
                data,
            },
        })
    }

    /// Returns the identifier which listeners subscribe to for this event.
    pub fn identifier(&self) -> EventIdentifier {
        use EventIdentifier as Id;

        match self {
            Event::Ready(_) => Id::Ready,
            Event::Resumed => Id::Resumed,
            Event::GuildCreate(_) => Id::GuildCreate,
            Event::GuildUpdate(_) => Id::GuildUpdate,
            Event::GuildDelete(_) => Id::GuildDelete,
            Event::GuildMemberAdd(_) => Id::GuildMemberAdd,
            Event::GuildMemberUpdate(_) => Id::GuildMemberUpdate,
            Event::GuildMemberRemove(_) => Id::GuildMemberRemove,
            Event::GuildRoleCreate(_) => Id::GuildRoleCreate,
            Event::GuildRoleUpdate(_) => Id::GuildRoleUpdate,
            Event::GuildRoleDelete(_) => Id::GuildRoleDelete,
            Event::ChannelCreate(_) => Id::ChannelCreate,
            Event::ChannelUpdate(_) => Id::ChannelUpdate,
            Event::ChannelDelete(_) => Id::ChannelDelete,
            Event::MessageCreate(_) => Id::MessageCreate,
            Event::MessageUpdate(_) => Id::MessageUpdate,
            Event::MessageDelete(_) => Id::MessageDelete,
            Event::Connected => Id::Connected,
            Event::Disconnected { .. } => Id::Disconnected,
            Event::Unknown { .. } => Id::Unknown,
        }
    }

    /// Returns the narrower sub-event this event should also be reported as.
    pub fn sub_identifier(&self) -> Option<EventIdentifier> {
        match self {
            Event::MessageCreate(msg) if msg.is_guild_message() =>
                Some(EventIdentifier::GuildMessageCreate),
            Event::MessageCreate(_) => Some(EventIdentifier::DirectMessageCreate),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::id::GuildId;
    use serde_json::json;

    fn received(name: &str, data: Value) -> ReceivedPayload {
        ReceivedPayload::new(GatewayPayload::dispatch(name, 1, data))
    }

    #[test]
    fn guild_message_has_sub_event() {
        let event = Event::from_payload(&received(
            event_name::MESSAGE_CREATE,
            json!({
                "id": "10",
                "channel_id": "11",
                "guild_id": "12",
                "author": {"id": "13", "username": "a"},
                "content": "hello",
            }),
        ))
        .unwrap();

        assert_eq!(event.identifier(), EventIdentifier::MessageCreate);
        assert_eq!(
            event.sub_identifier(),
            Some(EventIdentifier::GuildMessageCreate)
        );
        match event {
            Event::MessageCreate(msg) => assert_eq!(msg.guild_id, Some(GuildId(12))),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn unmodelled_dispatch_is_unknown() {
        let event = Event::from_payload(&received("TYPING_START", json!({"x": 1}))).unwrap();

        assert_eq!(event.identifier(), EventIdentifier::Unknown);
        assert!(matches!(event, Event::Unknown { ref name, .. } if name == "TYPING_START"));
    }

    #[test]
    fn malformed_data_is_rejected() {
        assert!(Event::from_payload(&received(event_name::GUILD_ROLE_DELETE, json!({}))).is_err());
        assert!(Event::from_payload(&ReceivedPayload::new(GatewayPayload::new(
            OpCode::Heartbeat,
            None
        )))
        .is_err());
    }
}
