//! RFC 1413 ident responder.
//!
//! Many IRC networks query the ident port of a connecting client and show
//! the answer as the user part of the hostmask. The responder answers every
//! query with the same configured identity, or with a fixed error.
//!
//! Requests are one line `client-port , server-port`; the reply is
//! `client-port , server-port : USERID : realm : user` or
//! `client-port , server-port : ERROR : kind`, after which the connection is
//! closed.

use futures_util::StreamExt;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, trace};

use crate::traits::TransportError;

/// Longest request accepted, terminator excluded.
pub const MAX_REQUEST_LEN: usize = 256;

/// Well-known ident port.
pub const DEFAULT_PORT: u16 = 113;

/// Default operating system realm.
pub const DEFAULT_REALM: &str = "UNIX";

/// Default user id.
pub const DEFAULT_USER: &str = "dcbridge";

/// Largest supported numeric suffix width.
pub const MAX_SUFFIX_DIGITS: u32 = 9;

/// Idle connections are dropped after this long.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ident error kinds, displayed as their wire tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentError {
    #[error("INVALID-PORT")]
    InvalidPort,
    #[error("NO-USER")]
    NoUser,
    #[error("HIDDEN-USER")]
    HiddenUser,
    #[error("UNKNOWN-ERROR")]
    UnknownError,
}

/// Answer to a well-formed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentReply {
    UserId { realm: String, user: String },
    Error(IdentError),
}

impl fmt::Display for IdentReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentReply::UserId { realm, user } => write!(f, "USERID : {realm} : {user}"),
            IdentReply::Error(kind) => write!(f, "ERROR : {kind}"),
        }
    }
}

/// How queries are answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Responder {
    /// Always answer with this error.
    Failure(IdentError),
    /// Answer with a user id.
    Success {
        realm: String,
        /// One is picked at random per query.
        users: Vec<String>,
        /// Width of a random zero-padded number appended to the user id.
        suffix_digits: u32,
        /// Shuffle the letters of the chosen user id.
        permute: bool,
    },
}

impl Default for Responder {
    fn default() -> Self {
        Self::success(DEFAULT_REALM, DEFAULT_USER)
    }
}

impl Responder {
    /// A responder that always answers with `user`.
    #[must_use]
    pub fn success(realm: impl Into<String>, user: impl Into<String>) -> Self {
        Responder::Success {
            realm: realm.into(),
            users: vec![user.into()],
            suffix_digits: 0,
            permute: false,
        }
    }

    /// Answer a query for a valid port pair.
    #[must_use]
    pub fn check(&self, _client_port: u16, _server_port: u16) -> IdentReply {
        match self {
            Responder::Failure(kind) => IdentReply::Error(*kind),
            Responder::Success {
                realm,
                users,
                suffix_digits,
                permute,
            } => {
                let mut rng = rand::thread_rng();
                let user = users
                    .choose(&mut rng)
                    .map_or(DEFAULT_USER, String::as_str);

                let mut user = if *permute {
                    let mut letters: Vec<char> = user.chars().collect();
                    letters.shuffle(&mut rng);
                    letters.into_iter().collect()
                } else {
                    user.to_string()
                };

                let digits = (*suffix_digits).min(MAX_SUFFIX_DIGITS);
                if digits > 0 {
                    let n = rng.gen_range(0..10u32.pow(digits));
                    user.push_str(&format!("{n:0width$}", width = digits as usize));
                }

                IdentReply::UserId {
                    realm: realm.clone(),
                    user,
                }
            }
        }
    }

    /// Build the full reply line for a raw request line.
    #[must_use]
    pub fn respond(&self, request: &str) -> String {
        let Some((client, server)) = request.trim().split_once(',') else {
            return format_reply(0, 0, &IdentReply::Error(IdentError::UnknownError));
        };

        let (Ok(client), Ok(server)) = (client.trim().parse::<i64>(), server.trim().parse::<i64>())
        else {
            return format_reply(0, 0, &IdentReply::Error(IdentError::InvalidPort));
        };

        match (u16::try_from(client), u16::try_from(server)) {
            (Ok(c), Ok(s)) => format_reply(client, server, &self.check(c, s)),
            _ => format_reply(client, server, &IdentReply::Error(IdentError::InvalidPort)),
        }
    }
}

fn format_reply(client: i64, server: i64, reply: &IdentReply) -> String {
    format!("{client} , {server} : {reply}")
}

/// TCP listener answering ident queries.
pub struct IdentServer {
    listener: TcpListener,
    responder: Arc<Responder>,
}

impl IdentServer {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails (port 113 usually needs privileges).
    pub async fn bind(addr: SocketAddr, responder: Responder) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "Ident responder listening");
        Ok(Self {
            listener,
            responder: Arc::new(responder),
        })
    }

    /// Get the local address this server is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Accept and answer queries until an accept error occurs.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting a connection fails.
    pub async fn run(self) -> Result<(), TransportError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let responder = Arc::clone(&self.responder);

            tokio::spawn(async move {
                if let Err(e) = answer(stream, &responder).await {
                    debug!(peer = %peer, error = %e, "Ident query failed");
                }
            });
        }
    }
}

async fn answer(stream: TcpStream, responder: &Responder) -> Result<(), TransportError> {
    let (read, mut write) = stream.into_split();
    let mut lines = FramedRead::new(read, LinesCodec::new_with_max_length(MAX_REQUEST_LEN));

    let reply = match tokio::time::timeout(REQUEST_TIMEOUT, lines.next()).await {
        Err(_) | Ok(None) => return Ok(()),
        Ok(Some(Ok(line))) => responder.respond(&line),
        Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => {
            format_reply(0, 0, &IdentReply::Error(IdentError::UnknownError))
        }
        Ok(Some(Err(LinesCodecError::Io(e)))) => return Err(e.into()),
    };

    trace!(reply = %reply, "Ident reply");
    write.write_all(format!("{reply}\r\n").as_bytes()).await?;
    write.shutdown().await?;
    Ok(())
}
