//! # dcbridge-core
//!
//! Presence and authority bridging between an IRC channel and a DC hub.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **EventRouter** - Dispatches IRC events to the handlers below
//! - **ChannelRoster** - Who is in the managed channels, with their flags
//! - **Mode parsing** - Privilege changes from MODE notifications
//! - **HubUserBridge** - Synthetic hub users and the hub operator set
//! - **OutboundRelay** - Rate-limited drain of hub text back to IRC
//! - **Sanitizer** - Escaping between the two wire formats
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌───────────────┐     ┌─────────┐
//! │  IRC event  │────▶│ EventRouter │────▶│ HubUserBridge │────▶│ HubCore │
//! └─────────────┘     └─────────────┘     └───────────────┘     └─────────┘
//!                            │                                       │
//!                            ▼                                       ▼
//!                     ┌─────────────┐     ┌───────────────┐     ┌─────────┐
//!                     │   Roster    │     │    IrcSink    │◀────│  Relay  │
//!                     └─────────────┘     └───────────────┘     └─────────┘
//! ```

pub mod bridge;
pub mod hub;
pub mod mode;
pub mod relay;
pub mod roster;
pub mod router;
pub mod sanitize;
pub mod sink;

pub use bridge::{BridgeError, HubUserBridge};
pub use hub::{HubCore, HubStats, MemoryHub, SyntheticHubUser};
pub use mode::{parse_privilege_modes, ModeChanges, ModeOp};
pub use relay::{OutboundRelay, RelayStats, CHUNK_LIMIT};
pub use roster::{ChannelRoster, ChannelUser, RosterError, UserAttrs};
pub use router::{BridgeStats, EventRouter, RouterConfig};
pub use sink::{CommandSink, IrcSink, RecordingSink};
