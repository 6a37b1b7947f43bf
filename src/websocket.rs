//! # WebSocket Session Transport
//!
//! Owns the persistent connection to the evaluation service.
//!
//! ## Connection:
//! An HTTP(S) upgrade to `wss://<host>/<language>/<mode>` carrying
//! `Authorization: Bearer <token>`. A refused upgrade is fatal for the run.
//!
//! ## Two independent directions:
//! [`Connection::split`] hands out a [`SessionSender`] (writer task) and a
//! [`SessionReceiver`] (reader task). Each half drives one direction of the
//! socket, so the two tasks never contend for a lock.
//!
//! ## Rust Concepts:
//! - **Generic halves**: both halves wrap any `Sink`/`Stream` of WebSocket
//!   messages, so tests can drive them with in-memory streams
//! - **Values instead of errors**: `receive()` reports read errors and closure
//!   as [`Received`] variants; the caller decides whether they end the loop

use crate::error::{AppError, AppResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

pub type WsError = tungstenite::Error;
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live, upgraded connection.
pub struct Connection {
    stream: WsStream,
}

/// Open the streaming connection, authorized with the bearer token.
pub async fn connect(url: &str, token: &str) -> AppResult<Connection> {
    let mut request = url
        .into_client_request()
        .map_err(|e| AppError::Connect(format!("invalid stream URL {}: {}", url, e)))?;

    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| AppError::Connect(format!("token is not a valid header value: {}", e)))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    debug!(url = %url, "Opening WebSocket connection");
    let (stream, response) = connect_async(request)
        .await
        .map_err(|e| AppError::Connect(describe_connect_error(e)))?;

    info!(
        url = %url,
        status = %response.status().as_u16(),
        "WebSocket connection established"
    );
    Ok(Connection { stream })
}

/// Surface the HTTP status and body when the server refuses the upgrade.
fn describe_connect_error(err: WsError) -> String {
    match err {
        WsError::Http(response) => {
            let body = response
                .body()
                .as_ref()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            format!("upgrade rejected with HTTP {}: {}", response.status(), body)
        }
        other => other.to_string(),
    }
}

impl Connection {
    /// Split into independently owned sending and receiving halves.
    pub fn split(
        self,
    ) -> (
        SessionSender<SplitSink<WsStream, Message>>,
        SessionReceiver<SplitStream<WsStream>>,
    ) {
        let (sink, stream) = self.stream.split();
        (SessionSender::new(sink), SessionReceiver::new(stream))
    }
}

/// Outbound half: structured (JSON text) and binary frames.
pub struct SessionSender<S> {
    sink: S,
}

impl<S> SessionSender<S>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Serialize `message` to JSON and send it as a text frame.
    pub async fn send_structured<T: Serialize>(&mut self, message: &T) -> AppResult<()> {
        let text = serde_json::to_string(message)?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| AppError::Transport(e.to_string()))
    }

    /// Send raw bytes as a binary frame.
    pub async fn send_binary(&mut self, bytes: Vec<u8>) -> AppResult<()> {
        self.sink
            .send(Message::Binary(bytes))
            .await
            .map_err(|e| AppError::Transport(e.to_string()))
    }

    /// Send a close frame and flush.
    pub async fn close(&mut self) -> AppResult<()> {
        self.sink
            .close()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))
    }

    #[cfg(test)]
    pub fn into_inner(self) -> S {
        self.sink
    }
}

/// What one `receive()` call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Text(String),
    Binary(Vec<u8>),
    /// A read failed; the connection may or may not still be usable
    Error(String),
    /// Close frame received or the stream ended; nothing more will arrive
    Closed,
}

/// Inbound half.
pub struct SessionReceiver<S> {
    stream: S,
}

impl<S> SessionReceiver<S>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Wait for the next data frame.
    ///
    /// Ping/pong frames are answered by the transport itself and skipped here.
    pub async fn receive(&mut self) -> Received {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Received::Text(text),
                Some(Ok(Message::Binary(data))) => return Received::Binary(data),
                Some(Ok(Message::Close(frame))) => {
                    debug!(frame = ?frame, "Close frame received");
                    return Received::Closed;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Received::Closed
                }
                Some(Err(e)) => return Received::Error(e.to_string()),
            }
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> S {
        self.stream
    }
}
