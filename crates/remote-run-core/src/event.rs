//! Events surfaced to callers.

use std::borrow::Cow;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of an [`Event`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Output,
    System,
    Unknown,
}

/// One unit of information received from the remote side.
///
/// Payloads are decoded but never parsed further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Raw remote stdout bytes.
    Output(Bytes),
    /// Control or status notice.
    System(Bytes),
    /// Frame of an unrecognized type, carrying the raw frame text.
    Unknown(Bytes),
}

impl Event {
    /// Kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Output(_) => EventKind::Output,
            Self::System(_) => EventKind::System,
            Self::Unknown(_) => EventKind::Unknown,
        }
    }

    /// Payload bytes.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        match self {
            Self::Output(data) | Self::System(data) | Self::Unknown(data) => data,
        }
    }

    /// Consume the event, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        match self {
            Self::Output(data) | Self::System(data) | Self::Unknown(data) => data,
        }
    }

    /// Payload as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn text_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.payload())
    }
}
