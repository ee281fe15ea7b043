use crate::model::event_name;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Names an event which listeners may subscribe to specifically.
///
/// Most identifiers correspond to one gateway dispatch. Some are
/// *sub-events*, derived from a broader dispatch: a `MESSAGE_CREATE` is
/// additionally reported as either [`GuildMessageCreate`] or
/// [`DirectMessageCreate`].
///
/// [`GuildMessageCreate`]: EventIdentifier::GuildMessageCreate
/// [`DirectMessageCreate`]: EventIdentifier::DirectMessageCreate
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum EventIdentifier {
    /// The session was identified and is receiving events.
    Ready,
    /// A previous session was resumed.
    Resumed,
    /// A guild became available, or the bot joined one.
    GuildCreate,
    /// A guild was modified.
    GuildUpdate,
    /// A guild became unavailable, or the bot left one.
    GuildDelete,
    /// A user joined a guild.
    GuildMemberAdd,
    /// A member was modified.
    GuildMemberUpdate,
    /// A user left a guild.
    GuildMemberRemove,
    /// A role was created.
    GuildRoleCreate,
    /// A role was modified.
    GuildRoleUpdate,
    /// A role was deleted.
    GuildRoleDelete,
    /// A channel was created.
    ChannelCreate,
    /// A channel was modified.
    ChannelUpdate,
    /// A channel was deleted.
    ChannelDelete,
    /// A message was sent anywhere.
    MessageCreate,
    /// A message was sent in a guild. Sub-event of [`MessageCreate`].
    ///
    /// [`MessageCreate`]: EventIdentifier::MessageCreate
    GuildMessageCreate,
    /// A message was sent in a DM. Sub-event of [`MessageCreate`].
    ///
    /// [`MessageCreate`]: EventIdentifier::MessageCreate
    DirectMessageCreate,
    /// A message was edited.
    MessageUpdate,
    /// A message was deleted.
    MessageDelete,
    /// The gateway connection was (re-)established.
    Connected,
    /// The gateway connection was lost.
    Disconnected,
    /// Any dispatch this library does not model.
    Unknown,
}

impl EventIdentifier {
    /// Maps a dispatch event name onto its identifier.
    ///
    /// Sub-events are never returned here, as they are not sent by Discord.
    pub fn from_event_name(name: &str) -> Self {
        use EventIdentifier::*;

        match name {
            event_name::READY => Ready,
            event_name::RESUMED => Resumed,
            event_name::GUILD_CREATE => GuildCreate,
            event_name::GUILD_UPDATE => GuildUpdate,
            event_name::GUILD_DELETE => GuildDelete,
            event_name::GUILD_MEMBER_ADD => GuildMemberAdd,
            event_name::GUILD_MEMBER_UPDATE => GuildMemberUpdate,
            event_name::GUILD_MEMBER_REMOVE => GuildMemberRemove,
            event_name::GUILD_ROLE_CREATE => GuildRoleCreate,
            event_name::GUILD_ROLE_UPDATE => GuildRoleUpdate,
            event_name::GUILD_ROLE_DELETE => GuildRoleDelete,
            event_name::CHANNEL_CREATE => ChannelCreate,
            event_name::CHANNEL_UPDATE => ChannelUpdate,
            event_name::CHANNEL_DELETE => ChannelDelete,
            event_name::MESSAGE_CREATE => MessageCreate,
            event_name::MESSAGE_UPDATE => MessageUpdate,
            event_name::MESSAGE_DELETE => MessageDelete,
            _ => Unknown,
        }
    }

    /// Whether this identifier is derived from another event, rather than
    /// sent by Discord.
    pub fn is_sub_event(self) -> bool {
        matches!(
            self,
            EventIdentifier::GuildMessageCreate | EventIdentifier::DirectMessageCreate
        )
    }
}

impl Display for EventIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        use EventIdentifier::*;

        let name = match self {
            Ready => event_name::READY,
            Resumed => event_name::RESUMED,
            GuildCreate => event_name::GUILD_CREATE,
            GuildUpdate => event_name::GUILD_UPDATE,
            GuildDelete => event_name::GUILD_DELETE,
            GuildMemberAdd => event_name::GUILD_MEMBER_ADD,
            GuildMemberUpdate => event_name::GUILD_MEMBER_UPDATE,
            GuildMemberRemove => event_name::GUILD_MEMBER_REMOVE,
            GuildRoleCreate => event_name::GUILD_ROLE_CREATE,
            GuildRoleUpdate => event_name::GUILD_ROLE_UPDATE,
            GuildRoleDelete => event_name::GUILD_ROLE_DELETE,
            ChannelCreate => event_name::CHANNEL_CREATE,
            ChannelUpdate => event_name::CHANNEL_UPDATE,
            ChannelDelete => event_name::CHANNEL_DELETE,
            MessageCreate => event_name::MESSAGE_CREATE,
            GuildMessageCreate => "GUILD_MESSAGE_CREATE",
            DirectMessageCreate => "DIRECT_MESSAGE_CREATE",
            MessageUpdate => event_name::MESSAGE_UPDATE,
            MessageDelete => event_name::MESSAGE_DELETE,
            Connected => "CONNECTED",
            Disconnected => "DISCONNECTED",
            Unknown => "UNKNOWN",
        };

        f.write_str(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dispatch_names_round_trip() {
        for name in [
            event_name::READY,
            event_name::GUILD_CREATE,
            event_name::GUILD_ROLE_DELETE,
            event_name::MESSAGE_CREATE,
        ] {
            assert_eq!(EventIdentifier::from_event_name(name).to_string(), name);
        }
    }

    #[test]
    fn message_create_is_not_ready() {
        assert_eq!(
            EventIdentifier::from_event_name(event_name::MESSAGE_CREATE),
            EventIdentifier::MessageCreate
        );
        assert_eq!(
            EventIdentifier::from_event_name("TYPING_START"),
            EventIdentifier::Unknown
        );
        assert!(EventIdentifier::GuildMessageCreate.is_sub_event());
        assert!(!EventIdentifier::MessageCreate.is_sub_event());
    }
}
