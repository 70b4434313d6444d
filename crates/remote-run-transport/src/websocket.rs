//! WebSocket connection provider.

use std::{
    pin::Pin,
    task::{Context, Poll, ready},
    time::Duration,
};

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use remote_run_core::{Connected, Connector, TransportError, WireMessage};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};

/// WebSocket connection speaking [`WireMessage`]s.
///
/// Transport-level ping/pong are absorbed here; tungstenite answers pings
/// on its own.
pub struct WsConnection<S = MaybeTlsStream<TcpStream>> {
    inner: WebSocketStream<S>,
}

impl<S> WsConnection<S> {
    /// Wrap an established WebSocket stream.
    #[must_use]
    pub const fn new(inner: WebSocketStream<S>) -> Self {
        Self { inner }
    }
}

fn map_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::Other(other.to_string()),
    }
}

fn to_tungstenite(msg: WireMessage) -> Message {
    match msg {
        WireMessage::Text(text) => Message::Text(text.into()),
        WireMessage::Binary(data) => Message::Binary(data),
        WireMessage::Ping(data) => Message::Ping(data),
        WireMessage::Pong(data) => Message::Pong(data),
        WireMessage::Close => Message::Close(None),
    }
}

impl<S> Stream for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<WireMessage, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let msg = match ready!(self.inner.poll_next_unpin(cx)) {
                None => return Poll::Ready(None),
                Some(Err(e)) => return Poll::Ready(Some(Err(map_error(e)))),
                Some(Ok(msg)) => msg,
            };

            let wire = match msg {
                Message::Text(text) => WireMessage::Text(text.as_str().to_owned()),
                Message::Binary(data) => WireMessage::Binary(data),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "WebSocket close frame");
                    WireMessage::Close
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Poll::Ready(Some(Ok(wire)));
        }
    }
}

impl<S> Sink<WireMessage> for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready_unpin(cx).map_err(map_error)
    }

    fn start_send(mut self: Pin<&mut Self>, item: WireMessage) -> Result<(), Self::Error> {
        self.inner.start_send_unpin(to_tungstenite(item)).map_err(map_error)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_flush_unpin(cx).map_err(map_error)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_close_unpin(cx).map_err(map_error)
    }
}

/// Connector opening `ws://` and `wss://` endpoints.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    /// Create a connector without a connect timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: None,
        }
    }

    /// Bound the time spent opening a connection.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Connection = WsConnection;

    async fn connect(&self, endpoint: &str) -> Result<Connected<WsConnection>, TransportError> {
        tracing::debug!(endpoint, "opening WebSocket");

        let handshake = connect_async(endpoint);
        let result = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => handshake.await,
        };
        let (stream, response) = result.map_err(|e| TransportError::Connect(e.to_string()))?;

        let server = response
            .headers()
            .get("server")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        tracing::debug!(endpoint, ?server, status = %response.status(), "WebSocket open");
        Ok(Connected {
            connection: WsConnection::new(stream),
            server,
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::DuplexStream, net::TcpListener};
    use tokio_tungstenite::{
        accept_hdr_async,
        tungstenite::{
            handshake::server::{ErrorResponse, Request, Response},
            http::HeaderValue,
            protocol::Role,
        },
    };

    use super::*;

    async fn duplex_pair() -> (WsConnection<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        (WsConnection::new(client), server)
    }

    #[tokio::test]
    async fn test_text_frames_both_ways() {
        let (mut client, mut server) = duplex_pair().await;

        client.send(WireMessage::text("2")).await.unwrap();
        let received = server.next().await.unwrap().unwrap();
        assert_eq!(received, Message::Text("2".into()));

        server.send(Message::Text("3".into())).await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), WireMessage::text("3"));
    }

    #[tokio::test]
    async fn test_ping_is_absorbed() {
        let (mut client, mut server) = duplex_pair().await;

        server.send(Message::Ping(vec![1u8, 2].into())).await.unwrap();
        server.send(Message::Text("7b2s=".into())).await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), WireMessage::text("7b2s="));
    }

    #[tokio::test]
    async fn test_binary_and_close_pass_through() {
        let (mut client, mut server) = duplex_pair().await;

        server.send(Message::Binary(vec![0xffu8].into())).await.unwrap();
        server.send(Message::Close(None)).await.unwrap();
        assert!(matches!(
            client.next().await.unwrap().unwrap(),
            WireMessage::Binary(_)
        ));
        assert_eq!(client.next().await.unwrap().unwrap(), WireMessage::Close);
    }

    #[tokio::test]
    async fn test_connector_reads_server_header() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = |_req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                resp.headers_mut()
                    .insert("server", HeaderValue::from_static("judge-42"));
                Ok(resp)
            };
            let mut ws = accept_hdr_async(tcp, callback).await.unwrap();
            ws.next().await.unwrap().unwrap()
        });

        let connector = WebSocketConnector::new().with_connect_timeout(Duration::from_secs(5));
        let Connected { mut connection, server: host } =
            connector.connect(&format!("ws://{addr}/run")).await.unwrap();
        assert_eq!(host.as_deref(), Some("judge-42"));

        connection.send(WireMessage::text("{}")).await.unwrap();
        assert_eq!(server.await.unwrap(), Message::Text("{}".into()));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WebSocketConnector::new()
            .connect(&format!("ws://{addr}/run"))
            .await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
