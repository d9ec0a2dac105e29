//! # dcbridge-protocol
//!
//! IRC wire protocol definitions for the dcbridge gateway.
//!
//! This crate covers everything the bridge needs to speak to an IRC server:
//! line parsing and serialization, the RFC 1459 case mapping, a tokio codec
//! for framed streams, and the typed inbound [`Event`] / outbound
//! [`Command`] vocabulary the rest of the workspace is written against.
//!
//! ## Example
//!
//! ```rust
//! use dcbridge_protocol::{Event, Message};
//!
//! let msg: Message = ":alice!a@host JOIN #dc".parse().unwrap();
//! let event = Event::from_message(&msg).unwrap();
//! assert_eq!(
//!     event,
//!     Event::Join { nick: "alice".into(), channel: "#dc".into() }
//! );
//! ```

pub mod casemap;
pub mod codec;
pub mod command;
pub mod event;
pub mod message;

pub use casemap::{irc_eq, irc_to_lower};
pub use codec::{IrcCodec, ProtocolError, MAX_LINE_LEN};
pub use command::Command;
pub use event::{Event, EventKind};
pub use message::{Message, Prefix};
