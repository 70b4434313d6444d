//! Session client.
//!
//! A [`Session`] owns one connection. Reads happen only through
//! [`Session::receive`]; writes from the caller and from the keepalive task
//! are serialized through a shared sink.

use std::{fmt, sync::Arc, time::Duration};

use futures::{
    SinkExt, Stream, StreamExt,
    stream::{SplitSink, SplitStream},
};
use remote_run_core::{
    ClientFrame, Connection, Event, ProtocolError, ServerFrame, TransportError, WireMessage,
};
use tokio::sync::Mutex;

use crate::keepalive::Keepalive;

/// Write half of a connection, shared with the keepalive task.
pub(crate) type SharedSink<C> = Arc<Mutex<SplitSink<C, WireMessage>>>;

/// Session error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    Connect(#[source] TransportError),
    #[error("Server did not report an assigned host")]
    MissingHost,
    #[error("Handshake failed: {0}")]
    Handshake(#[source] TransportError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("No frame received within {0:?}")]
    Timeout(Duration),
}

impl SessionError {
    /// Whether this is a receive timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Why a session stopped producing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Clean close, by either side.
    Closed,
    /// The transport failed.
    Error(String),
    /// A non-text frame arrived.
    NonText,
}

/// Encode `frame` and write it through the shared sink.
pub(crate) async fn write_frame<C: Connection>(
    sink: &SharedSink<C>,
    frame: &ClientFrame,
) -> Result<(), SessionError> {
    let text = frame.encode()?;
    let mut sink = sink.lock().await;
    sink.send(WireMessage::Text(text)).await?;
    Ok(())
}

/// One live remote execution.
pub struct Session<C: Connection> {
    reader: SplitStream<C>,
    writer: SharedSink<C>,
    host: String,
    echo: bool,
    input_in_flight: bool,
    keepalive: Keepalive,
    termination: Option<Termination>,
    closed: bool,
}

impl<C: Connection> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("echo", &self.echo)
            .field("input_in_flight", &self.input_in_flight)
            .field("termination", &self.termination)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> Session<C> {
    /// Wrap a connection that completed the handshake.
    ///
    /// Starts the keepalive task.
    pub(crate) fn new(connection: C, host: String, echo: bool, keepalive_interval: Duration) -> Self {
        let (writer, reader) = connection.split();
        let writer = Arc::new(Mutex::new(writer));
        let keepalive = Keepalive::spawn(Arc::clone(&writer), keepalive_interval);

        Self {
            reader,
            writer,
            host,
            echo,
            input_in_flight: false,
            keepalive,
            termination: None,
            closed: false,
        }
    }

    /// Worker assigned by the server.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether input echoes are surfaced as output.
    #[must_use]
    pub const fn echo(&self) -> bool {
        self.echo
    }

    /// Why the session ended, once it has.
    #[must_use]
    pub const fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    /// Whether the keepalive task is still running.
    #[must_use]
    pub fn keepalive_active(&self) -> bool {
        self.keepalive.is_active()
    }

    /// Send input to the remote program.
    ///
    /// Empty input is a no-op. Otherwise the next output frame is taken as
    /// the echo of this input and not surfaced, unless echo is enabled.
    ///
    /// # Errors
    /// Returns error if the write fails.
    pub async fn send(&mut self, text: &str) -> Result<(), SessionError> {
        let Some(frame) = ClientFrame::input(text) else {
            tracing::debug!("empty input, nothing sent");
            return Ok(());
        };

        write_frame(&self.writer, &frame).await?;
        self.input_in_flight = true;
        tracing::debug!(bytes = text.len(), "input sent");
        Ok(())
    }

    /// Receive the next event.
    ///
    /// Returns `Ok(None)` once the stream has terminated; see
    /// [`Session::termination`] for the reason. Housekeeping frames,
    /// keepalive acknowledgments and suppressed echoes are skipped. The
    /// timeout bounds only the wait for the first raw frame; frames read
    /// after a skipped one are awaited without a limit. A timeout does not
    /// close the session.
    ///
    /// # Errors
    /// Returns [`SessionError::Timeout`] if no frame arrives in time.
    pub async fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Event>, SessionError> {
        if self.termination.is_some() {
            return Ok(None);
        }

        let mut text = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.next_text())
                .await
                .map_err(|_| SessionError::Timeout(limit))?,
            None => self.next_text().await,
        };

        loop {
            let Some(raw) = text else {
                return Ok(None);
            };
            if let Some(event) = self.classify(&raw) {
                return Ok(Some(event));
            }
            text = self.next_text().await;
        }
    }

    /// Read one raw text frame, terminating the session on anything else.
    async fn next_text(&mut self) -> Option<String> {
        match self.reader.next().await {
            Some(Ok(WireMessage::Text(text))) => Some(text),
            Some(Ok(WireMessage::Close)) | None => {
                self.terminate(Termination::Closed);
                None
            }
            Some(Ok(other)) => {
                tracing::debug!(?other, "non-text frame");
                self.terminate(Termination::NonText);
                None
            }
            Some(Err(e)) => {
                self.terminate(Termination::Error(e.to_string()));
                None
            }
        }
    }

    /// Turn a raw frame into an event, or `None` if it is skipped.
    fn classify(&mut self, text: &str) -> Option<Event> {
        match ServerFrame::decode(text) {
            ServerFrame::Output(data) => {
                if self.echo || !self.input_in_flight {
                    return Some(Event::Output(data));
                }
                self.input_in_flight = false;
                tracing::debug!(bytes = data.len(), "suppressed input echo");
                None
            }
            ServerFrame::System(data) => Some(Event::System(data)),
            ServerFrame::Unknown(raw) => Some(Event::Unknown(raw)),
            ServerFrame::Housekeeping | ServerFrame::KeepaliveAck => {
                tracing::trace!(frame = %text, "filtered frame");
                None
            }
        }
    }

    fn terminate(&mut self, reason: Termination) {
        tracing::info!(host = %self.host, ?reason, "session terminated");
        self.keepalive.cancel();
        self.termination = Some(reason);
    }

    /// Close the connection.
    ///
    /// Stops the keepalive task. Safe to call more than once.
    pub async fn close(&mut self) {
        self.keepalive.cancel();
        if self.termination.is_none() {
            self.termination = Some(Termination::Closed);
        }
        if self.closed {
            return;
        }
        self.closed = true;

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            tracing::debug!("close on finished connection: {e}");
        }
    }

    /// Events until the stream terminates.
    ///
    /// Equivalent to calling `receive(None)` until it returns `Ok(None)`.
    /// Single pass: once exhausted, the session yields nothing more.
    pub fn events(&mut self) -> impl Stream<Item = Event> + '_ {
        futures::stream::unfold(self, |session| async move {
            let event = session.receive(None).await.ok()??;
            Some((event, session))
        })
    }
}
