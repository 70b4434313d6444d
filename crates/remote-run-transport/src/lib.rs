//! Connection providers for the remote run protocol.
//!
//! Provides:
//! - In-memory connector with a scriptable remote peer
//! - WebSocket connector (feature: websocket)

pub mod memory;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryConnection, MemoryConnector, RemotePeer};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnector, WsConnection};
