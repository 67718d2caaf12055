//! Async transport implementation using tokio

use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::{SocketError, codec};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Async transport for socket communication (stateless client)
pub struct AsyncTransport {
    socket_path: String,
}

/// Line-delimited connection usable from either side
pub struct AsyncConnection {
    pub reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    pub writer: tokio::net::unix::OwnedWriteHalf,
    // Bytes of the line being read; kept across cancelled reads
    line: Vec<u8>,
}

impl AsyncConnection {
    pub fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
            line: Vec::new(),
        }
    }

    /// Next complete line, or `None` at EOF.
    ///
    /// `read_until` keeps whatever it already consumed in `self.line`, so a
    /// read dropped by `select!` resumes where it stopped.
    async fn next_line(&mut self) -> Result<Option<String>, SocketError> {
        if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
            return Ok(None); // EOF - connection closed
        }
        let bytes = std::mem::take(&mut self.line);
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| SocketError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Read a client message from the connection (server-side)
    pub async fn read_client_message(&mut self) -> Result<Option<ClientMessage>, SocketError> {
        match self.next_line().await? {
            Some(line) => Ok(Some(codec::decode_client_message(&line)?)),
            None => Ok(None),
        }
    }

    /// Read a server message from the connection (client-side)
    pub async fn read_server_message(&mut self) -> Result<Option<ServerMessage>, SocketError> {
        match self.next_line().await? {
            Some(line) => Ok(Some(codec::decode_server_message(&line)?)),
            None => Ok(None),
        }
    }

    /// Write a client message to the connection (client-side)
    pub async fn write_message(&mut self, message: &ClientMessage) -> Result<(), SocketError> {
        let encoded = codec::encode_client_message(message)?;
        self.writer.write_all(encoded.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Write a server message to the connection (server-side)
    pub async fn write_server_message(&mut self, message: &ServerMessage) -> Result<(), SocketError> {
        let encoded = codec::encode_server_message(message)?;
        self.writer.write_all(encoded.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

impl AsyncTransport {
    pub fn new(socket_path: String) -> Self {
        Self { socket_path }
    }

    /// Connect to the socket and return a stateful connection
    pub async fn connect(&self) -> Result<AsyncConnection, SocketError> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            match e.kind() {
                std::io::ErrorKind::ConnectionRefused => SocketError::Connection(
                    "Service is not running. Use 'scarify service' to start the service."
                        .to_string(),
                ),
                std::io::ErrorKind::NotFound => SocketError::Connection(format!(
                    "Service socket not found at {}. Use 'scarify service' to start the service.",
                    self.socket_path
                )),
                _ => SocketError::Connection(format!(
                    "Failed to connect to service at {}: {}",
                    self.socket_path, e
                )),
            }
        })?;

        Ok(AsyncConnection::new(stream))
    }

    /// Send a client message and receive the matching response
    pub async fn send_request(&self, message: &ClientMessage) -> Result<ServerMessage, SocketError> {
        let mut conn = self.connect().await?;
        conn.write_message(message).await?;

        let response = tokio::time::timeout(REQUEST_TIMEOUT, conn.read_server_message())
            .await
            .map_err(|_| {
                SocketError::Connection(format!(
                    "Request timed out after {} seconds",
                    REQUEST_TIMEOUT.as_secs()
                ))
            })??
            .ok_or_else(|| SocketError::Connection("No response from server".to_string()))?;

        Ok(response)
    }
}
