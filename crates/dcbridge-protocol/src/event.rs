//! Typed inbound events.
//!
//! The bridge only reacts to a handful of IRC commands and numerics. This
//! module lifts raw [`Message`]s into [`Event`]s so handlers never index into
//! parameter lists themselves.

use crate::codec::ProtocolError;
use crate::message::Message;

/// The CTCP delimiter.
const CTCP_DELIM: char = '\x01';

/// Event kind identifiers, used for dispatch logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Welcome,
    NicknameInUse,
    Join,
    Part,
    Quit,
    Kick,
    NickChange,
    ChannelMessage,
    PrivateMessage,
    Action,
    NamesReply,
    EndOfNames,
    Mode,
    WhoReply,
    EndOfWho,
    Ping,
    Other,
}

impl EventKind {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Welcome => "welcome",
            EventKind::NicknameInUse => "nicknameinuse",
            EventKind::Join => "join",
            EventKind::Part => "part",
            EventKind::Quit => "quit",
            EventKind::Kick => "kick",
            EventKind::NickChange => "nick",
            EventKind::ChannelMessage => "pubmsg",
            EventKind::PrivateMessage => "privmsg",
            EventKind::Action => "action",
            EventKind::NamesReply => "namreply",
            EventKind::EndOfNames => "endofnames",
            EventKind::Mode => "mode",
            EventKind::WhoReply => "whoreply",
            EventKind::EndOfWho => "endofwho",
            EventKind::Ping => "ping",
            EventKind::Other => "other",
        }
    }
}

/// An inbound IRC event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `001 RPL_WELCOME`: registration completed under `nick`.
    Welcome { nick: String },

    /// `433 ERR_NICKNAMEINUSE` for the attempted nickname.
    NicknameInUse { nick: String },

    /// A user joined a channel.
    Join { nick: String, channel: String },

    /// A user left a channel.
    Part {
        nick: String,
        channel: String,
        reason: Option<String>,
    },

    /// A user disconnected from the network.
    Quit { nick: String, reason: Option<String> },

    /// `by` removed `nick` from `channel`.
    Kick {
        by: String,
        channel: String,
        nick: String,
    },

    /// A user changed nickname.
    NickChange { old: String, new: String },

    /// PRIVMSG addressed to a channel.
    ChannelMessage {
        nick: String,
        channel: String,
        text: String,
    },

    /// PRIVMSG addressed to a nickname.
    PrivateMessage { nick: String, text: String },

    /// CTCP ACTION (`/me`) to a channel or nickname.
    Action {
        nick: String,
        target: String,
        text: String,
    },

    /// `353 RPL_NAMREPLY`: one chunk of a channel membership snapshot.
    /// Names keep their status prefixes (`@alice`, `+bob`).
    NamesReply { channel: String, names: Vec<String> },

    /// `366 RPL_ENDOFNAMES`.
    EndOfNames { channel: String },

    /// Channel or user MODE change.
    Mode {
        actor: String,
        target: String,
        modes: String,
        args: Vec<String>,
    },

    /// `352 RPL_WHOREPLY`: `flags` looks like `H@` or `G+`.
    WhoReply {
        channel: String,
        nick: String,
        flags: String,
    },

    /// `315 RPL_ENDOFWHO`.
    EndOfWho { mask: String },

    /// Server keep-alive.
    Ping { token: String },

    /// Anything the bridge does not handle.
    Other { command: String },
}

/// Require at least `n` parameters.
fn require(msg: &Message, n: usize) -> Result<(), ProtocolError> {
    if msg.params.len() < n {
        return Err(ProtocolError::MissingParams {
            command: msg.command.clone(),
            expected: n,
            got: msg.params.len(),
        });
    }
    Ok(())
}

fn param(msg: &Message, index: usize) -> String {
    msg.param(index).unwrap_or_default().to_string()
}

fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

impl Event {
    /// Lift a raw message into an event.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingParams`] when a handled command lacks
    /// the parameters it needs. Unhandled commands become [`Event::Other`].
    pub fn from_message(msg: &Message) -> Result<Self, ProtocolError> {
        let source = msg.source_nick().unwrap_or_default().to_string();

        let event = match msg.command.as_str() {
            "001" => {
                require(msg, 1)?;
                Event::Welcome {
                    nick: param(msg, 0),
                }
            }
            "433" => {
                require(msg, 2)?;
                Event::NicknameInUse {
                    nick: param(msg, 1),
                }
            }
            "JOIN" => {
                require(msg, 1)?;
                Event::Join {
                    nick: source,
                    channel: param(msg, 0),
                }
            }
            "PART" => {
                require(msg, 1)?;
                Event::Part {
                    nick: source,
                    channel: param(msg, 0),
                    reason: msg.param(1).map(str::to_string),
                }
            }
            "QUIT" => Event::Quit {
                nick: source,
                reason: msg.param(0).map(str::to_string),
            },
            "KICK" => {
                require(msg, 2)?;
                Event::Kick {
                    by: source,
                    channel: param(msg, 0),
                    nick: param(msg, 1),
                }
            }
            "NICK" => {
                require(msg, 1)?;
                Event::NickChange {
                    old: source,
                    new: param(msg, 0),
                }
            }
            "PRIVMSG" => {
                require(msg, 2)?;
                let target = param(msg, 0);
                let text = param(msg, 1);

                if let Some(action) = parse_action(&text) {
                    Event::Action {
                        nick: source,
                        target,
                        text: action.to_string(),
                    }
                } else if text.starts_with(CTCP_DELIM) {
                    Event::Other {
                        command: "CTCP".into(),
                    }
                } else if is_channel(&target) {
                    Event::ChannelMessage {
                        nick: source,
                        channel: target,
                        text,
                    }
                } else {
                    Event::PrivateMessage { nick: source, text }
                }
            }
            "353" => {
                require(msg, 4)?;
                Event::NamesReply {
                    channel: param(msg, 2),
                    names: param(msg, 3)
                        .split_whitespace()
                        .map(str::to_string)
                        .collect(),
                }
            }
            "366" => {
                require(msg, 2)?;
                Event::EndOfNames {
                    channel: param(msg, 1),
                }
            }
            "MODE" => {
                require(msg, 2)?;
                Event::Mode {
                    actor: source,
                    target: param(msg, 0),
                    modes: param(msg, 1),
                    args: msg.params[2..].to_vec(),
                }
            }
            "352" => {
                require(msg, 7)?;
                Event::WhoReply {
                    channel: param(msg, 1),
                    nick: param(msg, 5),
                    flags: param(msg, 6),
                }
            }
            "315" => {
                require(msg, 2)?;
                Event::EndOfWho {
                    mask: param(msg, 1),
                }
            }
            "PING" => Event::Ping {
                token: param(msg, 0),
            },
            other => Event::Other {
                command: other.to_string(),
            },
        };

        Ok(event)
    }

    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Welcome { .. } => EventKind::Welcome,
            Event::NicknameInUse { .. } => EventKind::NicknameInUse,
            Event::Join { .. } => EventKind::Join,
            Event::Part { .. } => EventKind::Part,
            Event::Quit { .. } => EventKind::Quit,
            Event::Kick { .. } => EventKind::Kick,
            Event::NickChange { .. } => EventKind::NickChange,
            Event::ChannelMessage { .. } => EventKind::ChannelMessage,
            Event::PrivateMessage { .. } => EventKind::PrivateMessage,
            Event::Action { .. } => EventKind::Action,
            Event::NamesReply { .. } => EventKind::NamesReply,
            Event::EndOfNames { .. } => EventKind::EndOfNames,
            Event::Mode { .. } => EventKind::Mode,
            Event::WhoReply { .. } => EventKind::WhoReply,
            Event::EndOfWho { .. } => EventKind::EndOfWho,
            Event::Ping { .. } => EventKind::Ping,
            Event::Other { .. } => EventKind::Other,
        }
    }
}

/// Extract the text of a CTCP ACTION, if `text` is one.
fn parse_action(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(CTCP_DELIM)?;
    let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
    let (command, rest) = inner.split_once(' ').unwrap_or((inner, ""));
    command.eq_ignore_ascii_case("ACTION").then_some(rest)
}
