//! Transport layer for socket communication
//!
//! - `codec`: NDJSON encoding/decoding for messages
//! - `async_transport`: tokio client transport and server-side connection

use thiserror::Error;

mod async_transport;
mod codec;

pub use async_transport::{AsyncConnection, AsyncTransport};

/// Socket error types
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Socket connection error: {0}")]
    Connection(String),
    #[error("Service already running at socket: {0}")]
    AlreadyRunning(String),
    #[error("Socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
