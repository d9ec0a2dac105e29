//! Outbound commands issued by the bridge.

use crate::message::Message;

/// A command the bridge sends to the IRC server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register or change the bridge's own nickname.
    Nick(String),
    /// Connection registration.
    User {
        /// Username (ident).
        username: String,
        /// Free-form real name.
        realname: String,
    },
    /// Join a channel, optionally with a key.
    Join {
        /// Channel name.
        channel: String,
        /// Channel key.
        key: Option<String>,
    },
    /// Send a message to a channel or nickname.
    PrivMsg {
        /// Channel or nickname.
        target: String,
        /// Message text.
        text: String,
    },
    /// Send a notice to a channel or nickname.
    Notice {
        /// Channel or nickname.
        target: String,
        /// Notice text.
        text: String,
    },
    /// Query channel membership flags.
    Who(String),
    /// Answer a server PING.
    Pong(String),
    /// Disconnect.
    Quit(Option<String>),
}

impl Command {
    /// Create a PRIVMSG command.
    #[must_use]
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Command::PrivMsg {
            target: target.into(),
            text: text.into(),
        }
    }

    /// Create a NOTICE command.
    #[must_use]
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Command::Notice {
            target: target.into(),
            text: text.into(),
        }
    }

    /// Create a JOIN command.
    #[must_use]
    pub fn join(channel: impl Into<String>, key: Option<String>) -> Self {
        Command::Join {
            channel: channel.into(),
            key,
        }
    }

    /// Convert into a wire message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        match self {
            Command::Nick(nick) => Message::new("NICK", vec![nick.clone()]),
            Command::User { username, realname } => Message::new(
                "USER",
                vec![username.clone(), "0".into(), "*".into(), realname.clone()],
            ),
            Command::Join { channel, key } => {
                let mut params = vec![channel.clone()];
                params.extend(key.iter().cloned());
                Message::new("JOIN", params)
            }
            Command::PrivMsg { target, text } => {
                Message::new("PRIVMSG", vec![target.clone(), text.clone()])
            }
            Command::Notice { target, text } => {
                Message::new("NOTICE", vec![target.clone(), text.clone()])
            }
            Command::Who(mask) => Message::new("WHO", vec![mask.clone()]),
            Command::Pong(token) => Message::new("PONG", vec![token.clone()]),
            Command::Quit(reason) => Message::new("QUIT", reason.iter().cloned().collect()),
        }
    }
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        command.to_message()
    }
}
