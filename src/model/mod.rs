//! Wire model for the Discord gateway: payload framing, opcodes, close codes,
//! intents, and the minimal set of typed objects handed to listeners.

mod close_code;
mod intents;
mod objects;
mod payload;

pub use self::{close_code::*, intents::*, objects::*, payload::*};

use serde::de::DeserializeOwned;
use serde_json::{Error as JsonError, Value};
use std::{error::Error as StdError, fmt};

/// Names of dispatch events as sent in a payload's `t` field.
pub mod event_name {
    #![allow(missing_docs)]

    pub const READY: &str = "READY";
    pub const RESUMED: &str = "RESUMED";
    pub const GUILD_CREATE: &str = "GUILD_CREATE";
    pub const GUILD_UPDATE: &str = "GUILD_UPDATE";
    pub const GUILD_DELETE: &str = "GUILD_DELETE";
    pub const GUILD_MEMBER_ADD: &str = "GUILD_MEMBER_ADD";
    pub const GUILD_MEMBER_UPDATE: &str = "GUILD_MEMBER_UPDATE";
    pub const GUILD_MEMBER_REMOVE: &str = "GUILD_MEMBER_REMOVE";
    pub const GUILD_ROLE_CREATE: &str = "GUILD_ROLE_CREATE";
    pub const GUILD_ROLE_UPDATE: &str = "GUILD_ROLE_UPDATE";
    pub const GUILD_ROLE_DELETE: &str = "GUILD_ROLE_DELETE";
    pub const CHANNEL_CREATE: &str = "CHANNEL_CREATE";
    pub const CHANNEL_UPDATE: &str = "CHANNEL_UPDATE";
    pub const CHANNEL_DELETE: &str = "CHANNEL_DELETE";
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
    pub const MESSAGE_UPDATE: &str = "MESSAGE_UPDATE";
    pub const MESSAGE_DELETE: &str = "MESSAGE_DELETE";
}

/// Errors encountered while decoding gateway or REST payloads.
#[derive(Debug)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload was not valid JSON, or did not match the expected shape.
    Json(JsonError),
    /// A required field was absent.
    MissingField(&'static str),
}

impl From<JsonError> for DecodeError {
    fn from(e: JsonError) -> Self {
        DecodeError::Json(e)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to decode payload: ")?;
        match self {
            DecodeError::Json(e) => e.fmt(f),
            DecodeError::MissingField(name) => write!(f, "missing field `{}`", name),
        }
    }
}

impl StdError for DecodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DecodeError::Json(e) => Some(e),
            DecodeError::MissingField(_) => None,
        }
    }
}

/// Factory for typed objects built from raw, already-parsed JSON.
///
/// This is blanket-implemented for every [`DeserializeOwned`] type, so
/// applications can decode their own richer models from a payload's data.
pub trait FromData: Sized {
    /// Builds `Self` from raw payload data.
    fn from_data(data: Value) -> Result<Self, DecodeError>;
}

impl<T: DeserializeOwned> FromData for T {
    fn from_data(data: Value) -> Result<Self, DecodeError> {
        serde_json::from_value(data).map_err(DecodeError::from)
    }
}
