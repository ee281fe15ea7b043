use super::ShutdownOption;
use crate::model::DecodeError;
use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

/// Errors delivered through a [`QueueableFuture`], or returned when
/// submitting work to a [`RequestQueue`].
///
/// This type is cheaply cloneable so that the same outcome may be observed by
/// every listener and waiter on a future.
///
/// [`QueueableFuture`]: super::QueueableFuture
/// [`RequestQueue`]: super::RequestQueue
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum RequestError {
    /// The request was cancelled before it began, or abandoned by an
    /// immediate queue shutdown.
    Cancelled,
    /// The queue is shutting down and no longer accepts new requests.
    ShuttingDown,
    /// [`QueueableFuture::get`] was called from within a completion listener,
    /// where blocking would stall the whole queue.
    ///
    /// [`QueueableFuture::get`]: super::QueueableFuture::get
    BlockedInListener,
    /// Mutually exclusive shutdown options were combined.
    InvalidShutdownOptions(ShutdownOption),
    /// Discord asked us to wait before retrying this request.
    RateLimited {
        /// Time to wait before the request may be retried.
        retry_after: Duration,
        /// Whether the limit applies to every route, rather than one bucket.
        global: bool,
    },
    /// Discord answered with a non-success status code.
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned by Discord.
        body: String,
    },
    /// The HTTP transport failed before a response was received.
    Http(Arc<reqwest::Error>),
    /// The response body could not be decoded.
    Decode(Arc<DecodeError>),
    /// The route template referenced a parameter which was not supplied.
    MissingRouteParam(String),
}

impl RequestError {
    /// Whether this error reports a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestError::Cancelled)
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        RequestError::Http(Arc::new(e))
    }
}

impl From<DecodeError> for RequestError {
    fn from(e: DecodeError) -> Self {
        RequestError::Decode(Arc::new(e))
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::from(e).into()
    }
}

impl Display for RequestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "request failed: ")?;
        match self {
            RequestError::Cancelled => write!(f, "request was cancelled"),
            RequestError::ShuttingDown => write!(f, "request queue is shutting down"),
            RequestError::BlockedInListener =>
                write!(f, "cannot block on a future from within its listener"),
            RequestError::InvalidShutdownOptions(o) =>
                write!(f, "mutually exclusive shutdown options ({:?})", o),
            RequestError::RateLimited {
                retry_after,
                global,
            } => write!(
                f,
                "rate limited (global: {}), retry after {:?}",
                global, retry_after
            ),
            RequestError::Status { status, body } =>
                write!(f, "discord answered {}: {}", status, body),
            RequestError::Http(e) => e.fmt(f),
            RequestError::Decode(e) => e.fmt(f),
            RequestError::MissingRouteParam(p) => write!(f, "no value for route param {}", p),
        }
    }
}

impl StdError for RequestError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            RequestError::Http(e) => Some(e.as_ref()),
            RequestError::Decode(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Convenience type for request results.
pub type RequestResult<T> = Result<T, RequestError>;
