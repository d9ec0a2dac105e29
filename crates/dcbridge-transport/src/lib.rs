//! # dcbridge-transport
//!
//! Network plumbing for the dcbridge gateway.
//!
//! - **IrcConnection** - Client-side IRC connection abstraction
//! - **TcpIrcConnection** - Plain TCP implementation framed with [`IrcCodec`]
//! - **Ident** - RFC 1413 responder some IRC networks query on connect
//!
//! ## Connection Abstraction
//!
//! The server is written against the [`IrcConnection`] trait, so the bridge
//! loop does not care how lines reach the IRC network.
//!
//! ```rust,ignore
//! use dcbridge_transport::{IrcConnection, TcpIrcConnection};
//!
//! async fn run(mut conn: TcpIrcConnection) {
//!     while let Ok(Some(msg)) = conn.recv().await {
//!         // Process message
//!     }
//! }
//! ```
//!
//! [`IrcCodec`]: dcbridge_protocol::IrcCodec

pub mod ident;
pub mod tcp;
pub mod traits;

pub use ident::{IdentError, IdentServer, Responder};
pub use tcp::{ConnectConfig, TcpIrcConnection};
pub use traits::{ConnectionId, IrcConnection, TransportError};
