//! Raw IRC messages.
//!
//! A message is an optional source prefix, a command (word or three-digit
//! numeric) and up to fifteen parameters, the last of which may contain
//! spaces when introduced by `:`. IRCv3 tags are accepted and discarded.

use std::fmt;
use std::str::FromStr;

use crate::codec::ProtocolError;

/// Origin of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Prefix {
    /// A server name such as `irc.example.net`.
    Server(String),
    /// A user mask `nick!user@host`; user and host may be empty.
    User {
        /// Nickname.
        nick: String,
        /// Username (ident).
        user: String,
        /// Hostname.
        host: String,
    },
}

impl Prefix {
    /// Parse a prefix without the leading `:`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (name, rest) = match s.find(['!', '@']) {
            Some(idx) => (&s[..idx], Some(&s[idx..])),
            None => (s, None),
        };

        match rest {
            None if name.contains('.') => Prefix::Server(name.to_string()),
            None => Prefix::User {
                nick: name.to_string(),
                user: String::new(),
                host: String::new(),
            },
            Some(rest) => {
                let (user, host) = match rest.strip_prefix('!') {
                    Some(after) => match after.split_once('@') {
                        Some((u, h)) => (u, h),
                        None => (after, ""),
                    },
                    None => ("", rest.trim_start_matches('@')),
                };
                Prefix::User {
                    nick: name.to_string(),
                    user: user.to_string(),
                    host: host.to_string(),
                }
            }
        }
    }

    /// The nickname for user prefixes, or the server name otherwise.
    #[must_use]
    pub fn nick(&self) -> &str {
        match self {
            Prefix::Server(name) => name,
            Prefix::User { nick, .. } => nick,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Server(name) => f.write_str(name),
            Prefix::User { nick, user, host } => {
                f.write_str(nick)?;
                if !user.is_empty() {
                    write!(f, "!{user}")?;
                }
                if !host.is_empty() {
                    write!(f, "@{host}")?;
                }
                Ok(())
            }
        }
    }
}

/// A single IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Source of the message, if any.
    pub prefix: Option<Prefix>,
    /// Command word or numeric, as received.
    pub command: String,
    /// Parameters with the trailing `:` marker removed.
    pub params: Vec<String>,
}

impl Message {
    /// Create a message without a prefix.
    #[must_use]
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Attach a source prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Nickname of the sender, if the message carries a prefix.
    #[must_use]
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_ref().map(Prefix::nick)
    }

    /// Parameter at `index`, if present.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        if rest.starts_with('@') {
            rest = match rest.split_once(' ') {
                Some((_, after)) => after,
                None => return Err(ProtocolError::MissingCommand),
            };
        }
        rest = rest.trim_start_matches(' ');

        let prefix = if let Some(after) = rest.strip_prefix(':') {
            let (raw, tail) = after.split_once(' ').unwrap_or((after, ""));
            if raw.is_empty() {
                return Err(ProtocolError::InvalidPrefix(line.to_string()));
            }
            rest = tail.trim_start_matches(' ');
            Some(Prefix::parse(raw))
        } else {
            None
        };

        if rest.is_empty() {
            return Err(if prefix.is_none() && line.trim().is_empty() {
                ProtocolError::EmptyMessage
            } else {
                ProtocolError::MissingCommand
            });
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        let mut params = Vec::new();

        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    params.push(param.to_string());
                    rest = tail;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Message {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;

        if let Some((last, init)) = self.params.split_last() {
            for param in init {
                write!(f, " {param}")?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_prefix() {
        let msg: Message = ":alice!ali@example.org PRIVMSG #dc :hello there".parse().unwrap();
        assert_eq!(msg.source_nick(), Some("alice"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#dc", "hello there"]);
        assert_eq!(
            msg.prefix,
            Some(Prefix::User {
                nick: "alice".into(),
                user: "ali".into(),
                host: "example.org".into(),
            })
        );
    }

    #[test]
    fn test_parse_server_numeric() {
        let msg: Message = ":irc.example.net 353 bridge = #dc :@alice +bob carol"
            .parse()
            .unwrap();
        assert_eq!(msg.prefix, Some(Prefix::Server("irc.example.net".into())));
        assert_eq!(msg.command, "353");
        assert_eq!(msg.param(2), Some("#dc"));
        assert_eq!(msg.param(3), Some("@alice +bob carol"));
    }

    #[test]
    fn test_parse_tags_and_no_prefix() {
        let msg: Message = "@time=2024-01-01T00:00:00Z PING :token".parse().unwrap();
        assert!(msg.prefix.is_none());
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["token"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("".parse::<Message>(), Err(ProtocolError::EmptyMessage)));
        assert!(matches!(
            ":alice!a@h".parse::<Message>(),
            Err(ProtocolError::MissingCommand)
        ));
        assert!(matches!(
            ": PRIVMSG x".parse::<Message>(),
            Err(ProtocolError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_display_trailing() {
        let msg = Message::new("PRIVMSG", vec!["alice".into(), "hi there".into()]);
        assert_eq!(msg.to_string(), "PRIVMSG alice :hi there");

        let msg = Message::new("JOIN", vec!["#dc".into(), "key".into()]);
        assert_eq!(msg.to_string(), "JOIN #dc key");

        let msg = Message::new("PRIVMSG", vec!["bob".into(), String::new()]);
        assert_eq!(msg.to_string(), "PRIVMSG bob :");
    }

    #[test]
    fn test_display_prefix() {
        let msg = Message::new("NICK", vec!["carol".into()]).with_prefix(Prefix::parse("bob!b@h"));
        assert_eq!(msg.to_string(), ":bob!b@h NICK carol");
    }
}
