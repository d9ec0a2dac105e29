//! Transport abstraction traits for dcbridge.
//!
//! The bridge loop talks to the IRC network through [`IrcConnection`], so
//! tests and alternative transports can stand in for a TCP socket.

use async_trait::async_trait;
use dcbridge_protocol::{Message, ProtocolError};
use std::fmt;
use thiserror::Error;

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conn_{:x}", rand::random::<u64>()))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Could not reach the server.
    #[error("Connect to {addr} failed: {source}")]
    ConnectFailed {
        /// Address that was dialed.
        addr: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A client connection to an IRC server.
///
/// Implementations frame the byte stream into [`Message`]s in both
/// directions.
#[async_trait]
pub trait IrcConnection: Send {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Receive the next message.
    ///
    /// Returns `None` when the server closes the connection. Cancel safe:
    /// dropping the future loses no buffered data.
    async fn recv(&mut self) -> Result<Option<Message>, TransportError>;

    /// Send a message.
    async fn send(&mut self, msg: Message) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_connection_id_from_str() {
        let id: ConnectionId = "irc-1".into();
        assert_eq!(id.to_string(), "irc-1");
    }
}
