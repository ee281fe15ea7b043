//! Newtypes around Discord snowflake IDs.
//!
//! Discord transmits snowflakes as JSON strings to avoid precision loss in
//! JavaScript clients; these types accept either a string or a number.

use serde::{
    de::{Error as DeError, Visitor},
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Types which are uniquely identified by a snowflake.
pub trait HasId {
    /// The kind of ID this object is keyed by.
    type Id: Copy + Eq + std::hash::Hash;

    /// Returns the object's ID.
    fn id(&self) -> Self::Id;
}

macro_rules! impl_id {
    ($Id:ident) => {
        impl $Id {
            /// Returns the u64 representation of this Id.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl Display for $Id {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                Display::fmt(&self.0, f)
            }
        }

        impl From<u64> for $Id {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$Id> for u64 {
            fn from(id: $Id) -> Self {
                id.0
            }
        }

        impl Serialize for $Id {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $Id {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(SnowflakeVisitor).map(Self)
            }
        }
    };
}

struct SnowflakeVisitor;

impl<'de> Visitor<'de> for SnowflakeVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("a snowflake as a string or integer")
    }

    fn visit_u64<E: DeError>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: DeError>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| E::custom("snowflake was negative"))
    }

    fn visit_str<E: DeError>(self, v: &str) -> Result<u64, E> {
        v.parse().map_err(E::custom)
    }
}

/// ID of a Discord voice/text channel.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChannelId(pub u64);

/// ID of a Discord guild (colloquially, "server").
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GuildId(pub u64);

/// ID of a Discord message.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MessageId(pub u64);

/// ID of a Discord role.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RoleId(pub u64);

/// ID of a Discord user.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UserId(pub u64);

impl_id! {ChannelId}
impl_id! {GuildId}
impl_id! {MessageId}
impl_id! {RoleId}
impl_id! {UserId}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn snowflakes_parse_from_strings_and_numbers() {
        let from_str: GuildId = serde_json::from_str("\"81384788765712384\"").unwrap();
        let from_num: GuildId = serde_json::from_str("81384788765712384").unwrap();

        assert_eq!(from_str, from_num);
        assert_eq!(from_str.get(), 81_384_788_765_712_384);
    }

    #[test]
    fn snowflakes_serialize_as_strings() {
        let out = serde_json::to_string(&UserId(42)).unwrap();
        assert_eq!(out, "\"42\"");
    }

    #[test]
    fn garbage_snowflake_is_rejected() {
        assert!(serde_json::from_str::<ChannelId>("\"not-a-number\"").is_err());
        assert!(serde_json::from_str::<ChannelId>("-4").is_err());
    }
}
