//! Line codec for IRC streams.
//!
//! IRC frames are CRLF-terminated text lines of at most 512 bytes. Decoding
//! tolerates bare LF terminators and invalid UTF-8 (replaced lossily), since
//! servers relay whatever their clients send.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::message::Message;

/// Maximum line length in bytes, including the CRLF terminator.
pub const MAX_LINE_LEN: usize = 512;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Line exceeds the maximum length.
    #[error("Line length {0} exceeds maximum {MAX_LINE_LEN}")]
    LineTooLong(usize),

    /// Blank line.
    #[error("Empty message")]
    EmptyMessage,

    /// Prefix present but no command followed it.
    #[error("Missing command")]
    MissingCommand,

    /// Malformed source prefix.
    #[error("Invalid prefix in line: {0}")]
    InvalidPrefix(String),

    /// A known command arrived with fewer parameters than it requires.
    #[error("{command} requires {expected} parameters, got {got}")]
    MissingParams {
        /// Command name.
        command: String,
        /// Minimum parameter count.
        expected: usize,
        /// Parameters actually present.
        got: usize,
    },

    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a message as a CRLF-terminated line.
///
/// Embedded CR/LF characters are cut so a single message can never smuggle a
/// second command onto the wire.
///
/// # Errors
///
/// Returns an error if the encoded line exceeds [`MAX_LINE_LEN`].
pub fn encode(message: &Message) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a message into an existing buffer.
///
/// # Errors
///
/// Returns an error if the encoded line exceeds [`MAX_LINE_LEN`].
pub fn encode_into(message: &Message, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let line = message.to_string();
    let line = match line.find(['\r', '\n']) {
        Some(idx) => &line[..idx],
        None => line.as_str(),
    };

    if line.len() + 2 > MAX_LINE_LEN {
        return Err(ProtocolError::LineTooLong(line.len() + 2));
    }

    buf.reserve(line.len() + 2);
    buf.put_slice(line.as_bytes());
    buf.put_slice(b"\r\n");
    Ok(())
}

/// Decode a single line (with or without terminator).
///
/// # Errors
///
/// Returns an error if the line is empty or malformed.
pub fn decode(line: &str) -> Result<Message, ProtocolError> {
    line.parse()
}

/// Tokio codec producing [`Message`]s from a byte stream.
#[derive(Debug)]
pub struct IrcCodec {
    max_len: usize,
    /// Offset already scanned for a terminator.
    next_index: usize,
    /// Set while skipping the remainder of an oversized line.
    discarding: bool,
}

impl IrcCodec {
    /// Create a codec with the standard line limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Default for IrcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        loop {
            let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

            let Some(offset) = newline else {
                if src.len() > self.max_len {
                    // Drop what we have and skip until the next terminator.
                    let len = src.len();
                    src.advance(len);
                    self.next_index = 0;
                    if !self.discarding {
                        self.discarding = true;
                        return Err(ProtocolError::LineTooLong(len));
                    }
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            let raw = src.split_to(end + 1);

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            if line.len() + 2 > self.max_len {
                return Err(ProtocolError::LineTooLong(line.len() + 2));
            }
            return line.parse().map(Some);
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        encode_into(&message, dst)
    }
}
