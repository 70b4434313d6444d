//! In-memory connection provider.
//!
//! The remote side is driven by a [`RemotePeer`], which makes sessions
//! testable without a network and lets offline drivers script a server.

use std::{
    pin::Pin,
    sync::Mutex,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::{Sink, Stream, StreamExt};
use remote_run_core::{Connected, Connector, TransportError, WireMessage};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Client half of an in-memory connection.
pub struct MemoryConnection {
    incoming: UnboundedReceiverStream<WireMessage>,
    outgoing: Option<mpsc::UnboundedSender<WireMessage>>,
}

impl Stream for MemoryConnection {
    type Item = Result<WireMessage, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.incoming.poll_next_unpin(cx).map(|msg| msg.map(Ok))
    }
}

impl Sink<WireMessage> for MemoryConnection {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.outgoing.is_some() {
            Poll::Ready(Ok(()))
        } else {
            Poll::Ready(Err(TransportError::Closed))
        }
    }

    fn start_send(self: Pin<&mut Self>, item: WireMessage) -> Result<(), Self::Error> {
        self.outgoing
            .as_ref()
            .ok_or(TransportError::Closed)?
            .send(item)
            .map_err(|_| TransportError::Closed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Dropping the sender ends the peer's receive side.
        self.outgoing = None;
        Poll::Ready(Ok(()))
    }
}

/// Remote side of an in-memory connection.
pub struct RemotePeer {
    to_client: Option<mpsc::UnboundedSender<WireMessage>>,
    from_client: mpsc::UnboundedReceiver<WireMessage>,
}

impl RemotePeer {
    /// Send a message to the client.
    ///
    /// # Errors
    /// Returns error if the peer was closed or the client dropped the connection.
    pub fn send(&self, msg: WireMessage) -> Result<(), TransportError> {
        self.to_client
            .as_ref()
            .ok_or(TransportError::Closed)?
            .send(msg)
            .map_err(|_| TransportError::Closed)
    }

    /// Send a text frame to the client.
    ///
    /// # Errors
    /// Returns error if the peer was closed or the client dropped the connection.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.send(WireMessage::text(text))
    }

    /// Receive the next message written by the client.
    ///
    /// Returns `None` once the client closed its side.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.from_client.recv().await
    }

    /// Receive a message only if one is already queued.
    pub fn try_recv(&mut self) -> Option<WireMessage> {
        self.from_client.try_recv().ok()
    }

    /// Send a close frame and end the client's stream.
    pub fn close(&mut self) {
        if let Some(tx) = self.to_client.take() {
            let _ = tx.send(WireMessage::Close);
        }
    }

    /// End the client's stream without a close frame.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }
}

/// Connector handing out a single in-memory connection.
pub struct MemoryConnector {
    slot: Mutex<Option<MemoryConnection>>,
    server: Option<String>,
}

impl MemoryConnector {
    /// Create a connector and the peer driving its remote side.
    ///
    /// `server` is reported as the `server` response header.
    #[must_use]
    pub fn pair(server: Option<&str>) -> (Self, RemotePeer) {
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();

        let connection = MemoryConnection {
            incoming: UnboundedReceiverStream::new(client_rx),
            outgoing: Some(client_tx),
        };

        let connector = Self {
            slot: Mutex::new(Some(connection)),
            server: server.map(str::to_string),
        };

        let peer = RemotePeer {
            to_client: Some(to_client),
            from_client,
        };

        (connector, peer)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, endpoint: &str) -> Result<Connected<MemoryConnection>, TransportError> {
        let connection = self
            .slot
            .lock()
            .map_err(|e| TransportError::Other(e.to_string()))?
            .take()
            .ok_or_else(|| TransportError::Refused(format!("{endpoint}: connection already taken")))?;

        tracing::debug!(endpoint, "opened in-memory connection");
        Ok(Connected {
            connection,
            server: self.server.clone(),
        })
    }
}
