use bitflags::bitflags;

bitflags! {
    /// Gateway intents, selecting which groups of events a session receives.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct GatewayIntents: u32 {
        /// Guild, role and channel lifecycle events.
        const GUILDS = 1;
        /// Member add, update and remove events. Privileged.
        const GUILD_MEMBERS = 1 << 1;
        /// Bans and audit log entries.
        const GUILD_MODERATION = 1 << 2;
        /// Emoji and sticker updates.
        const GUILD_EMOJIS_AND_STICKERS = 1 << 3;
        /// Integration updates.
        const GUILD_INTEGRATIONS = 1 << 4;
        /// Webhook updates.
        const GUILD_WEBHOOKS = 1 << 5;
        /// Invite creation and deletion.
        const GUILD_INVITES = 1 << 6;
        /// Voice state updates.
        const GUILD_VOICE_STATES = 1 << 7;
        /// Presence updates. Privileged.
        const GUILD_PRESENCES = 1 << 8;
        /// Messages sent in guilds.
        const GUILD_MESSAGES = 1 << 9;
        /// Reactions to guild messages.
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        /// Typing in guild channels.
        const GUILD_MESSAGE_TYPING = 1 << 11;
        /// Messages sent in DMs.
        const DIRECT_MESSAGES = 1 << 12;
        /// Reactions to DMs.
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        /// Typing in DMs.
        const DIRECT_MESSAGE_TYPING = 1 << 14;
        /// Content of messages not addressed to the bot. Privileged.
        const MESSAGE_CONTENT = 1 << 15;
    }
}

impl GatewayIntents {
    /// Intents which must be enabled in the developer portal before use.
    pub const PRIVILEGED: Self = Self::GUILD_MEMBERS
        .union(Self::GUILD_PRESENCES)
        .union(Self::MESSAGE_CONTENT);

    /// Every intent which may be used without approval.
    pub fn non_privileged() -> Self {
        Self::all().difference(Self::PRIVILEGED)
    }

    /// Returns whether any privileged intent is requested.
    pub fn is_privileged(self) -> bool {
        self.intersects(Self::PRIVILEGED)
    }
}
