//! Minimal typed views of the objects carried by dispatch events.
//!
//! These hold only the fields needed for routing and for common bot logic;
//! every other field in the payload is ignored. Richer models can be decoded
//! from the raw payload via [`FromData`](super::FromData).

use crate::id::*;
use serde::{Deserialize, Serialize};

/// Payload of the `HELLO` opcode.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Hello {
    /// Interval (in milliseconds) at which to send heartbeats.
    pub heartbeat_interval: u64,
}

/// A Discord user.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct User {
    /// Unique ID of the user.
    pub id: UserId,
    /// Account name.
    pub username: String,
    /// Legacy four-digit tag, `"0"` for migrated accounts.
    #[serde(default)]
    pub discriminator: Option<String>,
    /// Display name, if set.
    #[serde(default)]
    pub global_name: Option<String>,
    /// Whether the account belongs to a bot.
    #[serde(default)]
    pub bot: bool,
}

/// A guild which is known to exist, but whose contents have not been sent.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UnavailableGuild {
    /// ID of the guild.
    pub id: GuildId,
    /// Set while the guild is offline due to an outage.
    #[serde(default)]
    pub unavailable: bool,
}

/// Payload of the `READY` dispatch.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Ready {
    /// Gateway version in use.
    #[serde(rename = "v")]
    pub version: u8,
    /// The bot's own user.
    pub user: User,
    /// ID used to resume this session.
    pub session_id: String,
    /// URL to connect to when resuming.
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
    /// Guilds the bot is in, each to be sent by a later `GUILD_CREATE`.
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    /// `[shard_id, shard_count]`, if sharding.
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
}

/// A guild role.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Role {
    /// Unique ID of the role.
    pub id: RoleId,
    /// Role name.
    pub name: String,
    /// RGB colour, or zero for none.
    #[serde(default)]
    pub color: u32,
    /// Sorting position in the role list.
    #[serde(default)]
    pub position: i64,
    /// Permission bit set, as a decimal string.
    #[serde(default)]
    pub permissions: Option<String>,
}

/// A guild, DM, or thread channel.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Channel {
    /// Unique ID of the channel.
    pub id: ChannelId,
    /// Discord's channel type number.
    #[serde(rename = "type")]
    pub kind: u8,
    /// Owning guild, absent for DMs.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Channel name, absent for DMs.
    #[serde(default)]
    pub name: Option<String>,
    /// Category, or parent channel for threads.
    #[serde(default)]
    pub parent_id: Option<ChannelId>,
}

/// A user's membership of a guild.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Member {
    /// The member's user, omitted in some message payloads.
    #[serde(default)]
    pub user: Option<User>,
    /// Guild of this membership, when sent by member events.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Guild nickname.
    #[serde(default)]
    pub nick: Option<String>,
    /// Roles held in the guild.
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

/// A guild, as sent by `GUILD_CREATE` and `GUILD_UPDATE`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Guild {
    /// Unique ID of the guild.
    pub id: GuildId,
    /// Guild name.
    #[serde(default)]
    pub name: String,
    /// Set while the guild is offline due to an outage.
    #[serde(default)]
    pub unavailable: bool,
    /// ID of the owning user.
    #[serde(default)]
    pub owner_id: Option<UserId>,
    /// Total members, only sent with `GUILD_CREATE`.
    #[serde(default)]
    pub member_count: Option<u64>,
    /// Roles defined in the guild.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Channels, only sent with `GUILD_CREATE`.
    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// A message sent in a channel.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Message {
    /// Unique ID of the message.
    pub id: MessageId,
    /// Channel the message was sent in.
    pub channel_id: ChannelId,
    /// Guild the message was sent in, absent for DMs.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Sender of the message.
    pub author: User,
    /// Text of the message. Empty without the message content intent.
    #[serde(default)]
    pub content: String,
    /// The author's guild membership, for guild messages.
    #[serde(default)]
    pub member: Option<Member>,
}

impl Message {
    /// Whether this message was sent within a guild (as opposed to a DM).
    pub fn is_guild_message(&self) -> bool {
        self.guild_id.is_some()
    }
}

/// Partial message data sent with `MESSAGE_UPDATE`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MessageUpdate {
    /// ID of the edited message.
    pub id: MessageId,
    /// Channel of the message.
    pub channel_id: ChannelId,
    /// Guild of the message, absent for DMs.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// New text, if it changed.
    #[serde(default)]
    pub content: Option<String>,
}

/// Payload of the `MESSAGE_DELETE` dispatch.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MessageDelete {
    /// ID of the deleted message.
    pub id: MessageId,
    /// Channel of the message.
    pub channel_id: ChannelId,
    /// Guild of the message, absent for DMs.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

/// Payload of the `GUILD_MEMBER_REMOVE` dispatch.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MemberRemove {
    /// Guild the user left.
    pub guild_id: GuildId,
    /// The user who left.
    pub user: User,
}

/// Payload of the `GUILD_ROLE_CREATE` and `GUILD_ROLE_UPDATE` dispatches.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RoleChange {
    /// Guild of the role.
    pub guild_id: GuildId,
    /// The role as it now stands.
    pub role: Role,
}

/// Payload of the `GUILD_ROLE_DELETE` dispatch.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RoleDelete {
    /// Guild of the role.
    pub guild_id: GuildId,
    /// ID of the deleted role.
    pub role_id: RoleId,
}

macro_rules! impl_has_id {
    ($($Ty:ty => $Id:ty),* $(,)?) => {
        $(
            impl HasId for $Ty {
                type Id = $Id;

                fn id(&self) -> $Id {
                    self.id
                }
            }
        )*
    };
}

impl_has_id! {
    User => UserId,
    UnavailableGuild => GuildId,
    Role => RoleId,
    Channel => ChannelId,
    Guild => GuildId,
    Message => MessageId,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::FromData;
    use serde_json::json;

    #[test]
    fn ready_decodes_guild_list() {
        let ready = Ready::from_data(json!({
            "v": 10,
            "user": {"id": "1", "username": "bot", "bot": true},
            "session_id": "abc",
            "resume_gateway_url": "wss://resume.example",
            "guilds": [{"id": "1", "unavailable": true}, {"id": "2", "unavailable": true}],
            "application": {"id": "1"}
        }))
        .unwrap();

        assert_eq!(ready.session_id, "abc");
        assert_eq!(
            ready.guilds.iter().map(HasId::id).collect::<Vec<_>>(),
            vec![GuildId(1), GuildId(2)]
        );
        assert!(ready.user.bot);
    }

    #[test]
    fn message_reports_guild_scope() {
        let msg = Message::from_data(json!({
            "id": "5",
            "channel_id": "6",
            "guild_id": "7",
            "author": {"id": "8", "username": "someone"},
            "content": "hi"
        }))
        .unwrap();

        assert!(msg.is_guild_message());
        assert_eq!(msg.id(), MessageId(5));
    }

    #[test]
    fn missing_required_fields_fail() {
        assert!(Message::from_data(json!({"id": "5"})).is_err());
    }
}
