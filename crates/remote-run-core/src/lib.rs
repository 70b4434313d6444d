//! Core types for the remote run protocol.
//!
//! This crate provides the transport-neutral building blocks:
//! - `Language` - Supported execution languages
//! - `Event` - Typed unit of remote output
//! - `protocol` - Frame codec for the discriminator-prefixed wire format
//! - `Submission` - Parsing of raw caller submissions
//! - `Connection` / `Connector` - Seams implemented by transports

pub mod event;
pub mod language;
pub mod protocol;
pub mod submission;
pub mod traits;

pub use event::{Event, EventKind};
pub use language::Language;
pub use protocol::{ClientFrame, ProtocolError, RunRequest, ServerFrame};
pub use submission::{Submission, SubmissionError};
pub use traits::{Connected, Connection, Connector, TransportError, WireMessage};
