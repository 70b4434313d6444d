//! Wire protocol for the remote run service.
//!
//! Every frame is a single text message whose first character is a
//! discriminator; the rest is frame-specific payload. Output and system
//! payloads from the server are base64 encoded.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Language;

/// Discriminator for input (outbound) and output (inbound) frames.
pub const TAG_IO: char = '1';
/// Discriminator for keepalive frames and their acknowledgment.
pub const TAG_KEEPALIVE: char = '2';
/// Discriminator for server housekeeping frames.
pub const TAG_HOUSEKEEPING: char = '3';
/// Discriminator for control (outbound) and system (inbound) frames.
pub const TAG_CONTROL: char = '7';

/// Fixed session id carried by every handshake.
pub const ORIGINAL_ID: u32 = 1;

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Handshake payload carried by the control frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Source code to run.
    #[serde(rename = "xml")]
    pub code: String,
    /// Mode marker, always `run`.
    #[serde(rename = "type")]
    pub mode: String,
    /// Target language.
    #[serde(rename = "lang")]
    pub language: Language,
    /// Session id expected by the server.
    pub original_id: u32,
    /// Program arguments.
    pub args: Vec<String>,
}

impl RunRequest {
    /// Create a run request.
    #[must_use]
    pub fn new(language: Language, code: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            code: code.into(),
            mode: "run".to_string(),
            language,
            original_id: ORIGINAL_ID,
            args,
        }
    }
}

/// Frame sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Empty JSON object sent right after connecting.
    Greeting,
    /// Handshake control frame.
    Run(RunRequest),
    /// Caller input, sent verbatim.
    Input(String),
    /// Keepalive.
    Keepalive,
}

impl ClientFrame {
    /// Input frame for `text`, or `None` when there is nothing to send.
    #[must_use]
    pub fn input(text: &str) -> Option<Self> {
        if text.is_empty() {
            None
        } else {
            Some(Self::Input(text.to_string()))
        }
    }

    /// Encode to the text frame sent on the wire.
    ///
    /// # Errors
    /// Returns error if the handshake payload fails to serialize.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(match self {
            Self::Greeting => serde_json::to_string(&serde_json::Map::new())?,
            Self::Run(request) => format!("{TAG_CONTROL}{}", serde_json::to_string(request)?),
            Self::Input(text) => format!("{TAG_IO}{text}"),
            Self::Keepalive => TAG_KEEPALIVE.to_string(),
        })
    }
}

/// Classified frame received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Program output.
    Output(Bytes),
    /// System notice.
    System(Bytes),
    /// Housekeeping frame, never surfaced.
    Housekeeping,
    /// Keepalive acknowledgment, never surfaced.
    KeepaliveAck,
    /// Unrecognized frame, carrying the raw text.
    Unknown(Bytes),
}

impl ServerFrame {
    /// Classify a text frame by its discriminator.
    ///
    /// Never fails: frames that cannot be decoded are downgraded to
    /// [`ServerFrame::Unknown`] with the raw text.
    #[must_use]
    pub fn decode(text: &str) -> Self {
        let mut chars = text.chars();
        let Some(tag) = chars.next() else {
            return Self::Unknown(Bytes::new());
        };
        let payload = chars.as_str();

        match tag {
            TAG_IO => decode_payload(text, payload).map_or_else(Self::unknown, Self::Output),
            TAG_CONTROL => decode_payload(text, payload).map_or_else(Self::unknown, Self::System),
            TAG_HOUSEKEEPING => Self::Housekeeping,
            TAG_KEEPALIVE => Self::KeepaliveAck,
            _ => Self::unknown(text),
        }
    }

    fn unknown(text: &str) -> Self {
        Self::Unknown(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Encode as the server would send it.
    ///
    /// Unknown frames are written back as their raw text.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Output(data) => format!("{TAG_IO}{}", BASE64.encode(data)),
            Self::System(data) => format!("{TAG_CONTROL}{}", BASE64.encode(data)),
            Self::Housekeeping => TAG_HOUSEKEEPING.to_string(),
            Self::KeepaliveAck => TAG_KEEPALIVE.to_string(),
            Self::Unknown(raw) => String::from_utf8_lossy(raw).into_owned(),
        }
    }

    /// Output frame carrying `data`.
    #[must_use]
    pub fn output(data: impl AsRef<[u8]>) -> Self {
        Self::Output(Bytes::copy_from_slice(data.as_ref()))
    }

    /// System frame carrying `data`.
    #[must_use]
    pub fn system(data: impl AsRef<[u8]>) -> Self {
        Self::System(Bytes::copy_from_slice(data.as_ref()))
    }

    /// Whether this frame is consumed without reaching the caller.
    #[must_use]
    pub const fn is_filtered(&self) -> bool {
        matches!(self, Self::Housekeeping | Self::KeepaliveAck)
    }
}

fn decode_payload<'a>(frame: &'a str, payload: &str) -> Result<Bytes, &'a str> {
    BASE64.decode(payload).map(Bytes::from).map_err(|e| {
        tracing::warn!("Undecodable frame payload, surfacing as unknown: {e}");
        frame
    })
}
