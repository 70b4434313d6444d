//! Session orchestration for the remote run protocol.
//!
//! Provides:
//! - `Session` - Live remote execution: send input, receive events
//! - `SessionFactory` - Connection handshake
//! - `ClientConfig` - Endpoint and timing configuration
//! - `execute` - One-shot run aggregated into a transcript

pub mod client;
pub mod config;
pub mod factory;
mod keepalive;
pub mod transcript;

pub use client::{Session, SessionError, Termination};
pub use config::{ClientConfig, ConfigError};
pub use factory::SessionFactory;
pub use transcript::{RunReport, RunSpec, Transcript, execute};
