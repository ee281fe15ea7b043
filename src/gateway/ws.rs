use crate::model::{DecodeError, GatewayPayload};
use async_tungstenite::{
    tokio::{connect_async, ConnectStream},
    tungstenite::{
        error::Error as TungsteniteError,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    WebSocketStream,
};
use futures::{SinkExt, TryStreamExt};
use std::{borrow::Cow, fmt};
use tracing::{debug, instrument};
use url::Url;

pub(crate) struct WsStream(WebSocketStream<ConnectStream>);

impl WsStream {
    #[instrument]
    pub(crate) async fn connect(url: Url) -> Result<Self> {
        let (stream, _) = connect_async(url.as_str()).await?;

        Ok(Self(stream))
    }

    /// Waits for the next payload.
    ///
    /// Returns `Ok(None)` for frames which carry no payload, such as pings.
    pub(crate) async fn recv_json(&mut self) -> Result<Option<GatewayPayload>> {
        convert_ws_message(self.0.try_next().await?)
    }

    pub(crate) async fn send_json(&mut self, value: &GatewayPayload) -> Result<()> {
        let text = value.to_json()?;
        self.0.send(Message::Text(text)).await?;

        Ok(())
    }

    /// Sends a close frame with the given code.
    pub(crate) async fn close(&mut self, code: u16) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Borrowed(""),
        };

        match self.0.close(Some(frame)).await {
            Ok(()) | Err(TungsteniteError::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the gateway's WebSocket transport.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A text frame did not hold a valid payload.
    Json(DecodeError),

    /// Compression is never requested, so only text frames are expected.
    UnexpectedBinaryMessage(Vec<u8>),

    /// The underlying socket failed.
    Ws(TungsteniteError),

    /// Discord closed the socket.
    WsClosed(Option<CloseFrame<'static>>),
}

impl Error {
    /// Returns the close code sent by Discord, if any.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Error::WsClosed(Some(frame)) => Some(frame.code.into()),
            _ => None,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Error {
        Error::Json(e)
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Error {
        Error::Ws(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gateway socket error: ")?;
        match self {
            Error::Json(e) => e.fmt(f),
            Error::UnexpectedBinaryMessage(b) => write!(f, "unexpected binary frame ({}B)", b.len()),
            Error::Ws(e) => e.fmt(f),
            Error::WsClosed(Some(frame)) => write!(f, "closed ({}): {}", frame.code, frame.reason),
            Error::WsClosed(None) => write!(f, "closed without a close frame"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json(e) => Some(e),
            Error::Ws(e) => Some(e),
            _ => None,
        }
    }
}

pub(crate) fn convert_ws_message(message: Option<Message>) -> Result<Option<GatewayPayload>> {
    Ok(match message {
        Some(Message::Text(payload)) => match GatewayPayload::from_json(&payload) {
            Ok(p) => Some(p),
            Err(e) => {
                debug!("Unexpected JSON: {}. Payload: {}", e, payload);
                return Err(e.into());
            },
        },
        Some(Message::Binary(bytes)) => {
            return Err(Error::UnexpectedBinaryMessage(bytes));
        },
        Some(Message::Close(frame)) => {
            return Err(Error::WsClosed(frame));
        },
        None => return Err(Error::WsClosed(None)),
        // Ping/Pong message behaviour is internally handled by tungstenite.
        _ => None,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::OpCode;

    #[test]
    fn text_frames_decode() {
        let payload = convert_ws_message(Some(Message::Text(
            r#"{"op":10,"d":{"heartbeat_interval":41250}}"#.into(),
        )))
        .unwrap()
        .unwrap();

        assert_eq!(payload.opcode(), OpCode::Hello);
    }

    #[test]
    fn close_frames_carry_code() {
        let err = convert_ws_message(Some(Message::Close(Some(CloseFrame {
            code: CloseCode::from(4004),
            reason: Cow::Borrowed("Authentication failed."),
        }))))
        .unwrap_err();

        assert_eq!(err.close_code(), Some(4004));
    }

    #[test]
    fn malformed_text_is_an_error() {
        assert!(matches!(
            convert_ws_message(Some(Message::Text("{".into()))),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            convert_ws_message(Some(Message::Ping(vec![]))),
            Ok(None)
        ));
    }
}
