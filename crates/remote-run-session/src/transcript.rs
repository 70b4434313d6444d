//! One-shot runs aggregated into a text transcript.

use std::time::Duration;

use remote_run_core::{Connector, Event, Language};
use tokio::time::Instant;

use crate::{SessionError, SessionFactory};

/// Marker appended when a run stops waiting for output.
pub const TIMEOUT_MARKER: &str = "\n[Timeout]";

/// Human-readable record of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    /// Start a transcript for a run on `host`.
    #[must_use]
    pub fn new(host: &str) -> Self {
        Self {
            text: format!("[Host {host}]\n"),
        }
    }

    /// Render one event.
    pub fn push(&mut self, event: &Event) {
        self.text.push_str(&render(event));
    }

    /// Record that the run timed out.
    pub fn push_timeout(&mut self) {
        self.text.push_str(TIMEOUT_MARKER);
    }

    /// Transcript text so far.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consume into the transcript text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.text
    }
}

/// Render an event the way it appears in a transcript.
#[must_use]
pub fn render(event: &Event) -> String {
    match event {
        Event::Output(_) => event.text_lossy().into_owned(),
        Event::System(_) => format!("[System {}]\n", event.text_lossy()),
        Event::Unknown(_) => format!("[Unknown {}]\n", event.text_lossy()),
    }
}

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub language: Language,
    pub code: String,
    /// Input sent once after the handshake; empty sends nothing.
    pub stdin: String,
    pub args: Vec<String>,
}

impl RunSpec {
    /// Run `code` without input or arguments.
    #[must_use]
    pub fn new(language: Language, code: impl Into<String>) -> Self {
        Self {
            language,
            code: code.into(),
            stdin: String::new(),
            args: Vec::new(),
        }
    }

    /// Set the input.
    #[must_use]
    pub fn stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }

    /// Set program arguments.
    #[must_use]
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Result of a one-shot run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Aggregated transcript.
    pub transcript: String,
    /// Wall-clock time from connecting to the end of the run.
    pub elapsed: Duration,
    /// Whether the run ended on a receive timeout.
    pub timed_out: bool,
}

/// Run `spec` to completion and aggregate everything it produced.
///
/// Sends the input once, then drains events until the stream terminates or
/// no event arrives within the configured receive timeout. A timeout closes
/// the session and is recorded in the transcript rather than returned.
///
/// # Errors
/// Returns error if the session cannot be established or the input cannot
/// be written.
pub async fn execute<K: Connector>(
    factory: &SessionFactory<K>,
    spec: &RunSpec,
) -> Result<RunReport, SessionError> {
    let started = Instant::now();
    let mut session = factory
        .create(spec.language, &spec.code, spec.args.clone())
        .await?;
    let mut transcript = Transcript::new(session.host());

    if let Err(e) = session.send(&spec.stdin).await {
        session.close().await;
        return Err(e);
    }

    let limit = factory.config().receive_timeout();
    let mut timed_out = false;
    loop {
        match session.receive(Some(limit)).await {
            Ok(Some(event)) => transcript.push(&event),
            Ok(None) => break,
            Err(e) if e.is_timeout() => {
                tracing::info!(host = %session.host(), ?limit, "run timed out");
                transcript.push_timeout();
                timed_out = true;
                break;
            }
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        }
    }
    session.close().await;

    Ok(RunReport {
        transcript: transcript.into_string(),
        elapsed: started.elapsed(),
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_each_kind() {
        let mut transcript = Transcript::new("w1");
        transcript.push(&Event::System("compiled".into()));
        transcript.push(&Event::Output("1\n".into()));
        transcript.push(&Event::Unknown("9abc".into()));
        transcript.push_timeout();

        assert_eq!(
            transcript.as_str(),
            "[Host w1]\n[System compiled]\n1\n[Unknown 9abc]\n\n[Timeout]"
        );
    }

    #[test]
    fn test_run_spec_builder() {
        let spec = RunSpec::new(Language::Python, "print(input())")
            .stdin("x")
            .args(["--fast"]);
        assert_eq!(spec.stdin, "x");
        assert_eq!(spec.args, vec!["--fast".to_string()]);
    }
}
