use super::{Event, EventIdentifier};
use crate::model::*;
use serde_json::Value;

/// Receives typed events from an [`EventTransmitter`].
///
/// Every hook does nothing by default: implement only those you need.
/// Hooks run on dispatch threads, and may run concurrently with one another
/// when the multi-threaded processor is in use.
///
/// A panicking hook is caught and logged, and does not affect other
/// listeners.
///
/// [`EventTransmitter`]: super::EventTransmitter
#[allow(unused_variables)]
pub trait EventListener: Send + Sync {
    /// Called when a new session is established.
    fn on_ready(&self, ready: &Ready) {}

    /// Called when a session is resumed.
    fn on_resumed(&self) {}

    /// Called for `GUILD_CREATE`.
    fn on_guild_create(&self, guild: &Guild) {}

    /// Called for `GUILD_UPDATE`.
    fn on_guild_update(&self, guild: &Guild) {}

    /// Called for `GUILD_DELETE`.
    fn on_guild_delete(&self, guild: &UnavailableGuild) {}

    /// Called for `GUILD_MEMBER_ADD`.
    fn on_guild_member_add(&self, member: &Member) {}

    /// Called for `GUILD_MEMBER_UPDATE`.
    fn on_guild_member_update(&self, member: &Member) {}

    /// Called for `GUILD_MEMBER_REMOVE`.
    fn on_guild_member_remove(&self, removal: &MemberRemove) {}

    /// Called for `GUILD_ROLE_CREATE`.
    fn on_guild_role_create(&self, change: &RoleChange) {}

    /// Called for `GUILD_ROLE_UPDATE`.
    fn on_guild_role_update(&self, change: &RoleChange) {}

    /// Called for `GUILD_ROLE_DELETE`.
    fn on_guild_role_delete(&self, deletion: &RoleDelete) {}

    /// Called for `CHANNEL_CREATE`.
    fn on_channel_create(&self, channel: &Channel) {}

    /// Called for `CHANNEL_UPDATE`.
    fn on_channel_update(&self, channel: &Channel) {}

    /// Called for `CHANNEL_DELETE`.
    fn on_channel_delete(&self, channel: &Channel) {}

    /// Called for every new message, in a guild or otherwise.
    fn on_message_create(&self, message: &Message) {}

    /// Called for new guild messages, when registered as a specified
    /// listener for [`EventIdentifier::GuildMessageCreate`].
    fn on_guild_message_create(&self, message: &Message) {}

    /// Called for new direct messages, when registered as a specified
    /// listener for [`EventIdentifier::DirectMessageCreate`].
    fn on_direct_message_create(&self, message: &Message) {}

    /// Called for `MESSAGE_UPDATE`.
    fn on_message_update(&self, update: &MessageUpdate) {}

    /// Called for `MESSAGE_DELETE`.
    fn on_message_delete(&self, deletion: &MessageDelete) {}

    /// Called when a socket opens and the gateway says `HELLO`.
    fn on_connected(&self) {}

    /// Called when a socket closes or fails.
    ///
    /// `code` is absent if the socket failed without a close frame.
    fn on_disconnected(&self, code: Option<GatewayCloseStatusCode>, reconnecting: bool) {}

    /// Called for dispatches without a typed representation.
    fn on_unknown(&self, name: &str, data: &Value) {}
}

/// Calls the hook on `listener` which matches `id`.
///
/// `id` is either the event's own identifier or one of its sub-events.
pub(crate) fn notify(listener: &dyn EventListener, id: EventIdentifier, event: &Event) {
    use EventIdentifier as Id;

    match (id, event) {
        (_, Event::Ready(ready)) => listener.on_ready(ready),
        (_, Event::Resumed) => listener.on_resumed(),
        (_, Event::GuildCreate(guild)) => listener.on_guild_create(guild),
        (_, Event::GuildUpdate(guild)) => listener.on_guild_update(guild),
        (_, Event::GuildDelete(guild)) => listener.on_guild_delete(guild),
        (_, Event::GuildMemberAdd(member)) => listener.on_guild_member_add(member),
        (_, Event::GuildMemberUpdate(member)) => listener.on_guild_member_update(member),
        (_, Event::GuildMemberRemove(removal)) => listener.on_guild_member_remove(removal),
        (_, Event::GuildRoleCreate(change)) => listener.on_guild_role_create(change),
        (_, Event::GuildRoleUpdate(change)) => listener.on_guild_role_update(change),
        (_, Event::GuildRoleDelete(deletion)) => listener.on_guild_role_delete(deletion),
        (_, Event::ChannelCreate(channel)) => listener.on_channel_create(channel),
        (_, Event::ChannelUpdate(channel)) => listener.on_channel_update(channel),
        (_, Event::ChannelDelete(channel)) => listener.on_channel_delete(channel),
        (Id::GuildMessageCreate, Event::MessageCreate(msg)) => listener.on_guild_message_create(msg),
        (Id::DirectMessageCreate, Event::MessageCreate(msg)) =>
            listener.on_direct_message_create(msg),
        (_, Event::MessageCreate(msg)) => listener.on_message_create(msg),
        (_, Event::MessageUpdate(update)) => listener.on_message_update(update),
        (_, Event::MessageDelete(deletion)) => listener.on_message_delete(deletion),
        (_, Event::Connected) => listener.on_connected(),
        (_, Event::Disconnected { code, reconnecting }) =>
            listener.on_disconnected(*code, *reconnecting),
        (_, Event::Unknown { name, data }) => listener.on_unknown(name, data),
    }
}
