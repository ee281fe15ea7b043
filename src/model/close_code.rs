use std::fmt::{Display, Formatter, Result as FmtResult};

/// What a session should do after the gateway closed with a given code.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ClosePolicy {
    /// Reconnect, attempting to resume the existing session.
    Resume,
    /// Reconnect, but the old session is gone: identify from scratch.
    Reidentify,
    /// Do not reconnect. The configuration or credentials must change first.
    Fatal,
}

/// Discord gateway close codes.
///
/// Codes outside of the documented `4000..=4014` range map to
/// [`Unknown`], which is treated as resumable.
///
/// [`Unknown`]: GatewayCloseStatusCode::Unknown
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum GatewayCloseStatusCode {
    /// We're not sure what went wrong.
    UnknownError,
    /// An invalid opcode or payload for an opcode was sent.
    UnknownOpcode,
    /// An invalid payload was sent.
    DecodeError,
    /// A payload was sent prior to identifying.
    NotAuthenticated,
    /// The account token sent with the identify payload is incorrect.
    AuthenticationFailed,
    /// More than one identify payload was sent.
    AlreadyAuthenticated,
    /// The session is no longer valid.
    SessionNoLongerValid,
    /// The sequence sent when resuming the session was invalid.
    InvalidSequence,
    /// Payloads are being sent too quickly.
    RateLimited,
    /// The session timed out.
    SessionTimedOut,
    /// An invalid shard was sent when identifying.
    InvalidShard,
    /// The session would have handled too many guilds without sharding.
    ShardingRequired,
    /// An invalid version for the gateway was sent.
    InvalidApiVersion,
    /// An invalid intent was sent.
    InvalidIntents,
    /// A disallowed (privileged, but not enabled) intent was sent.
    DisallowedIntents,
    /// Any other close code, including standard WebSocket codes.
    Unknown(u16),
}

impl GatewayCloseStatusCode {
    /// Maps a raw close code onto its named constant. Never fails.
    pub fn from_int(code: u16) -> Self {
        match code {
            4000 => Self::UnknownError,
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4006 => Self::SessionNoLongerValid,
            4007 => Self::InvalidSequence,
            4008 => Self::RateLimited,
            4009 => Self::SessionTimedOut,
            4010 => Self::InvalidShard,
            4011 => Self::ShardingRequired,
            4012 => Self::InvalidApiVersion,
            4013 => Self::InvalidIntents,
            4014 => Self::DisallowedIntents,
            other => Self::Unknown(other),
        }
    }

    /// Returns the raw close code.
    pub fn code(self) -> u16 {
        match self {
            Self::UnknownError => 4000,
            Self::UnknownOpcode => 4001,
            Self::DecodeError => 4002,
            Self::NotAuthenticated => 4003,
            Self::AuthenticationFailed => 4004,
            Self::AlreadyAuthenticated => 4005,
            Self::SessionNoLongerValid => 4006,
            Self::InvalidSequence => 4007,
            Self::RateLimited => 4008,
            Self::SessionTimedOut => 4009,
            Self::InvalidShard => 4010,
            Self::ShardingRequired => 4011,
            Self::InvalidApiVersion => 4012,
            Self::InvalidIntents => 4013,
            Self::DisallowedIntents => 4014,
            Self::Unknown(other) => other,
        }
    }

    /// Returns how a session should react to this close code.
    pub fn policy(self) -> ClosePolicy {
        match self {
            Self::AuthenticationFailed
            | Self::InvalidShard
            | Self::ShardingRequired
            | Self::InvalidApiVersion
            | Self::InvalidIntents
            | Self::DisallowedIntents => ClosePolicy::Fatal,
            Self::SessionNoLongerValid | Self::InvalidSequence | Self::SessionTimedOut =>
                ClosePolicy::Reidentify,
            _ => ClosePolicy::Resume,
        }
    }

    /// Whether a new connection may be attempted at all.
    pub fn should_reconnect(self) -> bool {
        self.policy() != ClosePolicy::Fatal
    }

    /// Whether the previous session survives this closure.
    pub fn should_resume(self) -> bool {
        self.policy() == ClosePolicy::Resume
    }

    /// Human readable reason for this close code.
    pub fn reason(self) -> &'static str {
        match self {
            Self::UnknownError => "unknown error",
            Self::UnknownOpcode => "unknown opcode",
            Self::DecodeError => "decode error",
            Self::NotAuthenticated => "not authenticated",
            Self::AuthenticationFailed => "authentication failed",
            Self::AlreadyAuthenticated => "already authenticated",
            Self::SessionNoLongerValid => "session no longer valid",
            Self::InvalidSequence => "invalid sequence",
            Self::RateLimited => "rate limited",
            Self::SessionTimedOut => "session timed out",
            Self::InvalidShard => "invalid shard",
            Self::ShardingRequired => "sharding required",
            Self::InvalidApiVersion => "invalid API version",
            Self::InvalidIntents => "invalid intent(s)",
            Self::DisallowedIntents => "disallowed intent(s)",
            Self::Unknown(_) => "unknown close code",
        }
    }
}

impl From<u16> for GatewayCloseStatusCode {
    fn from(code: u16) -> Self {
        Self::from_int(code)
    }
}

impl Display for GatewayCloseStatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} ({})", self.reason(), self.code())
    }
}
