//! Outbound IRC surface.
//!
//! Handlers never write to the socket directly. They push [`Command`]s into
//! an [`IrcSink`], which in the server is an unbounded queue the session
//! loop flushes between events, so no handler ever awaits network I/O.

use crate::sanitize;
use dcbridge_protocol::Command;
use tokio::sync::mpsc;
use tracing::warn;

/// Outbound transport operations used by the bridge.
pub trait IrcSink {
    /// Queue a raw command.
    fn send(&mut self, command: Command);

    /// Join a channel, optionally with a key.
    fn join(&mut self, channel: &str, key: Option<&str>) {
        self.send(Command::join(channel, key.map(str::to_string)));
    }

    /// Change the bridge's own nickname.
    fn change_nick(&mut self, nick: &str) {
        self.send(Command::Nick(nick.to_string()));
    }

    /// Send a PRIVMSG after sanitizing it for IRC.
    fn send_message(&mut self, target: &str, text: &str) {
        self.send(Command::privmsg(target, sanitize::for_irc(text)));
    }

    /// Send a NOTICE after sanitizing it for IRC.
    fn send_notice(&mut self, target: &str, text: &str) {
        self.send(Command::notice(target, sanitize::for_irc(text)));
    }

    /// Answer a server PING.
    fn pong(&mut self, token: &str) {
        self.send(Command::Pong(token.to_string()));
    }
}

/// Sink backed by an unbounded channel to the session loop.
#[derive(Debug, Clone)]
pub struct CommandSink {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSink {
    /// Create a sink and the receiver the session loop drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl IrcSink for CommandSink {
    fn send(&mut self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("Transport writer gone, dropping command");
        }
    }
}

/// Sink that records commands in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Commands in the order they were sent.
    pub commands: Vec<Command>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all recorded commands.
    pub fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

impl IrcSink for RecordingSink {
    fn send(&mut self, command: Command) {
        self.commands.push(command);
    }
}
