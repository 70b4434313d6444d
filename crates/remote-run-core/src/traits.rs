//! Transport seams.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink, Stream};
use thiserror::Error;

/// Transport-neutral message on a streaming connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Text frame; the only kind the protocol uses.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
    /// Transport-level ping.
    Ping(Bytes),
    /// Transport-level pong.
    Pong(Bytes),
    /// Close frame.
    Close,
}

impl WireMessage {
    /// Text frame from anything string-like.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Connection refused: {0}")]
    Refused(String),
    #[error("Connection timed out")]
    Timeout,
    #[error("Connection closed")]
    Closed,
    #[error("Transport error: {0}")]
    Other(String),
}

/// Bidirectional frame connection.
///
/// Blanket-implemented for every stream/sink pair of [`WireMessage`]s.
pub trait Connection:
    Stream<Item = Result<WireMessage, TransportError>>
    + Sink<WireMessage, Error = TransportError>
    + Send
    + Unpin
    + 'static
{
}

impl<T> Connection for T where
    T: Stream<Item = Result<WireMessage, TransportError>>
        + Sink<WireMessage, Error = TransportError>
        + Send
        + Unpin
        + 'static
{
}

/// Freshly opened connection plus response metadata.
pub struct Connected<C> {
    /// The connection.
    pub connection: C,
    /// Value of the `server` response header, naming the assigned worker.
    pub server: Option<String>,
}

/// Trait for connection providers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connection type produced.
    type Connection: Connection;

    /// Open a connection to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<Connected<Self::Connection>, TransportError>;
}
