//! Session factory: connection and handshake.

use futures::SinkExt;
use remote_run_core::{ClientFrame, Connected, Connector, Language, RunRequest, WireMessage};
use tracing::instrument;

use crate::{ClientConfig, Session, SessionError};

/// Opens connections and performs the handshake.
pub struct SessionFactory<K: Connector> {
    connector: K,
    config: ClientConfig,
}

impl<K: Connector> SessionFactory<K> {
    /// Create a factory.
    #[must_use]
    pub const fn new(connector: K, config: ClientConfig) -> Self {
        Self { connector, config }
    }

    /// Configuration used for new sessions.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Override the echo policy for new sessions.
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.config.echo = echo;
        self
    }

    /// Open a connection and start running `code`.
    ///
    /// Sends the greeting and the run request, then reads the assigned host
    /// from the `server` response header. No session is returned on failure.
    ///
    /// # Errors
    /// Returns error if the connection cannot be opened, the server reports
    /// no host, or a handshake frame cannot be written.
    #[instrument(skip(self, code, args), fields(endpoint = %self.config.endpoint))]
    pub async fn create(
        &self,
        language: Language,
        code: &str,
        args: Vec<String>,
    ) -> Result<Session<K::Connection>, SessionError> {
        let Connected { mut connection, server } = self
            .connector
            .connect(&self.config.endpoint)
            .await
            .map_err(SessionError::Connect)?;

        let Some(host) = server.filter(|s| !s.is_empty()) else {
            if let Err(e) = connection.close().await {
                tracing::debug!("close after missing host: {e}");
            }
            return Err(SessionError::MissingHost);
        };

        let frames = [
            ClientFrame::Greeting,
            ClientFrame::Run(RunRequest::new(language, code, args)),
        ];
        for frame in &frames {
            let text = frame.encode()?;
            connection
                .send(WireMessage::Text(text))
                .await
                .map_err(SessionError::Handshake)?;
        }

        tracing::info!(%host, "session established");
        Ok(Session::new(
            connection,
            host,
            self.config.echo,
            self.config.keepalive_interval(),
        ))
    }
}
