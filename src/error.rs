//! Gateway and client error handling.

use crate::model::GatewayCloseStatusCode;
use std::{error::Error, fmt, io::Error as IoError};
use url::ParseError;

#[derive(Debug)]
#[non_exhaustive]
/// Error returned when a gateway session ends, or cannot be driven.
pub enum GatewayError {
    /// Discord closed the session with a code which forbids reconnecting,
    /// such as an invalid token or disallowed intents.
    ///
    /// *The configuration must be changed before connecting again.*
    Fatal(GatewayCloseStatusCode),
    /// The [reconnect limit] was reached without the session recovering.
    ///
    /// [reconnect limit]: crate::gateway::retry::Retry::retry_limit
    RetriesExhausted,
    /// The configured gateway URL could not be parsed.
    InvalidUrl(ParseError),
    /// The gateway runner is no longer running, so commands cannot be sent.
    Closed,
    /// The gateway runner's task panicked or was aborted.
    TaskFailed,
}

impl GatewayError {
    /// Indicates whether the session may succeed if it is simply started
    /// again, without changing the configuration.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, GatewayError::Fatal(_) | GatewayError::InvalidUrl(_))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gateway session failed: ")?;
        match self {
            GatewayError::Fatal(code) => write!(f, "closed by Discord ({}).", code),
            GatewayError::RetriesExhausted => write!(f, "reconnect attempts exhausted."),
            GatewayError::InvalidUrl(e) => write!(f, "invalid gateway url {}.", e),
            GatewayError::Closed => write!(f, "runner has stopped."),
            GatewayError::TaskFailed => write!(f, "runner task failed."),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GatewayError::InvalidUrl(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for GatewayError {
    fn from(e: ParseError) -> Self {
        GatewayError::InvalidUrl(e)
    }
}

/// Convenience type for gateway error handling.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug)]
#[non_exhaustive]
/// Error returned when a [`Client`] cannot be built.
///
/// [`Client`]: crate::Client
pub enum ClientError {
    /// The gateway could not be configured.
    Gateway(GatewayError),
    /// The HTTP client could not be built.
    Http(reqwest::Error),
    /// The background runtime could not be started.
    Runtime(IoError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to start client: ")?;
        match self {
            ClientError::Gateway(e) => write!(f, "{}", e),
            ClientError::Http(e) => write!(f, "http client error {}.", e),
            ClientError::Runtime(e) => write!(f, "runtime error {}.", e),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientError::Gateway(e) => Some(e),
            ClientError::Http(e) => Some(e),
            ClientError::Runtime(e) => Some(e),
        }
    }
}

impl From<GatewayError> for ClientError {
    fn from(e: GatewayError) -> Self {
        ClientError::Gateway(e)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e)
    }
}

impl From<IoError> for ClientError {
    fn from(e: IoError) -> Self {
        ClientError::Runtime(e)
    }
}

pub use crate::{
    gateway::ws::Error as WsError,
    model::DecodeError,
    request::{RequestError, RequestResult},
};
