//! Plain TCP IRC client connection.

use async_trait::async_trait;
use bytes::BytesMut;
use dcbridge_protocol::{Command, IrcCodec, Message, ProtocolError, MAX_LINE_LEN};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, info, warn};

use crate::traits::{ConnectionId, IrcConnection, TransportError};

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Give up connecting after this long.
    pub connect_timeout: Duration,
    /// Maximum inbound line length, CRLF included.
    pub max_line_len: usize,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6667,
            connect_timeout: Duration::from_secs(30),
            max_line_len: MAX_LINE_LEN,
        }
    }
}

impl ConnectConfig {
    /// `host:port` string.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// [`IrcCodec`] that logs and skips lines it cannot parse.
///
/// A decode error would otherwise pause the framed stream.
#[derive(Debug, Default)]
struct LenientCodec(IrcCodec);

impl Decoder for LenientCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        loop {
            match self.0.decode(src) {
                Err(ProtocolError::Io(e)) => return Err(ProtocolError::Io(e)),
                Err(e) => warn!(error = %e, "Skipping malformed IRC line"),
                other => return other,
            }
        }
    }
}

impl Encoder<Message> for LenientCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        self.0.encode(message, dst)
    }
}

/// An IRC connection over TCP.
pub struct TcpIrcConnection {
    id: ConnectionId,
    framed: Framed<TcpStream, LenientCodec>,
    remote_addr: SocketAddr,
    is_open: bool,
}

impl TcpIrcConnection {
    /// Connect to an IRC server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached in time.
    pub async fn connect(config: &ConnectConfig) -> Result<Self, TransportError> {
        let addr = config.addr();
        debug!(addr = %addr, "Connecting to IRC server");

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|source| TransportError::ConnectFailed {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        let remote_addr = stream.peer_addr()?;

        info!(addr = %addr, remote = %remote_addr, "Connected to IRC server");
        Ok(Self::from_stream(stream, remote_addr, config.max_line_len))
    }

    /// Wrap an established stream.
    #[must_use]
    pub fn from_stream(stream: TcpStream, remote_addr: SocketAddr, max_line_len: usize) -> Self {
        Self {
            id: ConnectionId::generate(),
            framed: Framed::new(stream, LenientCodec(IrcCodec::with_max_len(max_line_len))),
            remote_addr,
            is_open: true,
        }
    }

    /// Send the NICK/USER registration pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails while sending.
    pub async fn register(
        &mut self,
        nick: &str,
        username: &str,
        realname: &str,
    ) -> Result<(), TransportError> {
        debug!(nick = %nick, username = %username, "Registering");
        self.send(Command::Nick(nick.to_string()).into()).await?;
        self.send(
            Command::User {
                username: username.to_string(),
                realname: realname.to_string(),
            }
            .into(),
        )
        .await
    }
}

#[async_trait]
impl IrcConnection for TcpIrcConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Message>, TransportError> {
        match self.framed.next().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => {
                self.is_open = false;
                Err(match e {
                    ProtocolError::Io(io) => TransportError::Io(io),
                    other => TransportError::Protocol(other),
                })
            }
            None => {
                debug!(remote = %self.remote_addr, "Server closed connection");
                self.is_open = false;
                Ok(None)
            }
        }
    }

    async fn send(&mut self, msg: Message) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        self.framed.send(msg).await.map_err(|e| match e {
            ProtocolError::Io(io) => {
                self.is_open = false;
                TransportError::Io(io)
            }
            other => TransportError::Protocol(other),
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.is_open {
            self.is_open = false;
            SinkExt::<Message>::close(&mut self.framed)
                .await
                .map_err(|e| match e {
                    ProtocolError::Io(io) => TransportError::Io(io),
                    other => TransportError::Protocol(other),
                })?;
        }
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.remote_addr.to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    async fn pair() -> (TcpIrcConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = ConnectConfig {
            port,
            ..ConnectConfig::default()
        };

        let (conn, accepted) = tokio::join!(TcpIrcConnection::connect(&config), listener.accept());
        (conn.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_register_writes_nick_and_user() {
        let (mut conn, server) = pair().await;
        conn.register("bridge", "dcbridge", "DC hub bridge")
            .await
            .unwrap();

        let mut lines = BufReader::new(server).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK bridge");
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "USER dcbridge 0 * :DC hub bridge"
        );
    }

    #[tokio::test]
    async fn test_recv_skips_malformed_lines() {
        let (mut conn, mut server) = pair().await;
        server
            .write_all(b":alice!a@h JOIN #dc\r\n:\r\nPING :irc.example.net\r\n")
            .await
            .unwrap();

        let first = conn.recv().await.unwrap().unwrap();
        assert_eq!(first.command, "JOIN");
        let second = conn.recv().await.unwrap().unwrap();
        assert_eq!(second.command, "PING");

        drop(server);
        assert!(conn.recv().await.unwrap().is_none());
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut conn, _server) = pair().await;
        conn.close().await.unwrap();
        assert!(matches!(
            conn.send(Command::Pong("x".into()).into()).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
