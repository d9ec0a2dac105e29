//! Event router for the bridge.
//!
//! The router receives one IRC event at a time, in delivery order, and runs
//! exactly one handler for it. It owns the [`ChannelRoster`] and the
//! [`HubUserBridge`], so every roster or hub mutation happens here,
//! synchronously, before the next event is looked at.

use crate::bridge::{BridgeError, HubUserBridge, NICK_SUFFIX};
use crate::hub::HubCore;
use crate::mode::{parse_privilege_modes, split_status_prefix, who_flags_privileged};
use crate::relay::{OutboundRelay, RelayStats};
use crate::roster::{ChannelRoster, ChannelUser, UserAttrs};
use crate::sanitize;
use crate::sink::IrcSink;
use dcbridge_protocol::{irc_eq, Command, Event, Message};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Nickname the bridge registers with.
    pub nickname: String,
    /// Channel whose members are mirrored into the hub.
    pub chat_channel: String,
    /// Key for the chat channel.
    pub chat_key: Option<String>,
    /// Channel whose privilege state drives hub operator status.
    pub management_channel: Option<String>,
    /// Key for the management channel.
    pub management_key: Option<String>,
    /// Give up on registration after this many nickname conflicts.
    pub max_nick_retries: Option<u32>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            nickname: "dcbridge".to_string(),
            chat_channel: "#dcbridge".to_string(),
            chat_key: None,
            management_channel: None,
            management_key: None,
            max_nick_retries: None,
        }
    }
}

/// What a managed channel is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelRole {
    Chat,
    Management,
    /// Management channel configured to the chat channel's name.
    Both,
}

impl ChannelRole {
    fn is_chat(self) -> bool {
        matches!(self, ChannelRole::Chat | ChannelRole::Both)
    }

    fn is_management(self) -> bool {
        matches!(self, ChannelRole::Management | ChannelRole::Both)
    }
}

/// Router statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// The bridge's current IRC nickname.
    pub nickname: String,
    /// Members across managed channels.
    pub roster_members: usize,
    /// Members holding privilege in the authority channel.
    pub roster_operators: usize,
    /// Materialized hub users.
    pub hub_users: usize,
}

/// Dispatches IRC events to roster, bridge and hub.
#[derive(Debug)]
pub struct EventRouter<H> {
    config: RouterConfig,
    own_nick: String,
    nick_attempts: u32,
    roster: ChannelRoster,
    bridge: HubUserBridge<H>,
    relay: OutboundRelay,
}

impl<H: HubCore> EventRouter<H> {
    /// Create a router driving `hub`.
    #[must_use]
    pub fn new(config: RouterConfig, hub: H) -> Self {
        Self::with_relay(config, hub, OutboundRelay::default())
    }

    /// Create a router with a custom relay.
    #[must_use]
    pub fn with_relay(config: RouterConfig, hub: H, relay: OutboundRelay) -> Self {
        info!(
            nickname = %config.nickname,
            chat = %config.chat_channel,
            management = ?config.management_channel,
            "Creating event router"
        );
        Self {
            own_nick: config.nickname.clone(),
            config,
            nick_attempts: 0,
            roster: ChannelRoster::new(),
            bridge: HubUserBridge::new(hub),
            relay,
        }
    }

    /// Router configuration.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The bridge's current IRC nickname.
    #[must_use]
    pub fn own_nick(&self) -> &str {
        &self.own_nick
    }

    /// The channel roster.
    #[must_use]
    pub fn roster(&self) -> &ChannelRoster {
        &self.roster
    }

    /// The hub user bridge.
    #[must_use]
    pub fn bridge(&self) -> &HubUserBridge<H> {
        &self.bridge
    }

    /// The hub user bridge, mutably.
    pub fn bridge_mut(&mut self) -> &mut HubUserBridge<H> {
        &mut self.bridge
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            nickname: self.own_nick.clone(),
            roster_members: self.roster.len(),
            roster_operators: self.roster.operator_count(),
            hub_users: self.bridge.len(),
        }
    }

    /// Drain one chunk of every synthetic user's outbound text.
    pub fn relay_tick(&mut self, sink: &mut impl IrcSink) -> RelayStats {
        self.relay.tick(&mut self.bridge, sink)
    }

    /// Forget all channel state after the IRC connection drops.
    ///
    /// Returns the number of hub users removed.
    pub fn reset(&mut self) -> usize {
        let removed = self.bridge.dematerialize_all();
        self.roster.clear();
        self.own_nick = self.config.nickname.clone();
        self.nick_attempts = 0;
        info!(removed, "Bridge state reset");
        removed
    }

    /// Lift a raw message into an event and handle it.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is malformed or the handler failed.
    pub fn handle_message(
        &mut self,
        msg: &Message,
        sink: &mut impl IrcSink,
    ) -> Result<(), BridgeError> {
        let event = Event::from_message(msg)?;
        self.handle(event, sink)
    }

    /// Handle one event.
    ///
    /// Errors are never fatal: the caller logs them and carries on with
    /// the next event.
    ///
    /// # Errors
    ///
    /// Returns the error that made the handler skip its work.
    pub fn handle(&mut self, event: Event, sink: &mut impl IrcSink) -> Result<(), BridgeError> {
        trace!(kind = event.kind().as_str(), "Dispatching event");

        match event {
            Event::Welcome { nick } => {
                self.on_welcome(&nick, sink);
                Ok(())
            }
            Event::NicknameInUse { nick } => self.on_nickname_in_use(&nick, sink),
            Event::Join { nick, channel } => self.on_join(&nick, &channel, sink),
            Event::Part { nick, channel, .. } => self.on_part(&nick, &channel),
            Event::Quit { nick, .. } => self.on_quit(&nick),
            Event::Kick { by, channel, nick } => self.on_kick(&by, &channel, &nick, sink),
            Event::NickChange { old, new } => self.on_nick_change(&old, &new),
            Event::ChannelMessage {
                nick,
                channel,
                text,
            } => {
                self.on_channel_message(&nick, &channel, &text);
                Ok(())
            }
            Event::Action { nick, target, text } => {
                self.on_action(&nick, &target, &text);
                Ok(())
            }
            Event::PrivateMessage { nick, .. } => {
                debug!(nick = %nick, "Ignoring private message to the bridge");
                Ok(())
            }
            Event::NamesReply { channel, names } => {
                self.on_names(&channel, &names);
                Ok(())
            }
            Event::EndOfNames { channel } => {
                debug!(channel = %channel, members = self.roster.len(), hub_users = self.bridge.len(), "End of NAMES");
                Ok(())
            }
            Event::Mode {
                actor,
                target,
                modes,
                args,
            } => {
                self.on_mode(&actor, &target, &modes, &args);
                Ok(())
            }
            Event::WhoReply {
                channel,
                nick,
                flags,
            } => self.on_who_reply(&channel, &nick, &flags),
            Event::EndOfWho { mask } => {
                debug!(mask = %mask, operators = self.roster.operator_count(), "End of WHO");
                Ok(())
            }
            Event::Ping { token } => {
                sink.pong(&token);
                Ok(())
            }
            Event::Other { command } => {
                trace!(command = %command, "Unhandled IRC command");
                Ok(())
            }
        }
    }

    fn is_self(&self, nick: &str) -> bool {
        irc_eq(nick, &self.own_nick)
    }

    /// Role of `channel`, or `None` if it is not managed.
    fn role(&self, channel: &str) -> Option<ChannelRole> {
        let chat = irc_eq(channel, &self.config.chat_channel);
        let management = self
            .config
            .management_channel
            .as_deref()
            .is_some_and(|m| irc_eq(channel, m));

        match (chat, management) {
            (true, true) => Some(ChannelRole::Both),
            (true, false) => Some(ChannelRole::Chat),
            (false, true) => Some(ChannelRole::Management),
            (false, false) => None,
        }
    }

    /// Whether privilege in a channel of this role counts for the hub.
    fn is_authority(&self, role: ChannelRole) -> bool {
        if self.config.management_channel.is_some() {
            role.is_management()
        } else {
            role.is_chat()
        }
    }

    fn channel_key(&self, role: ChannelRole) -> Option<&str> {
        match role {
            ChannelRole::Management => self.config.management_key.as_deref(),
            _ => self.config.chat_key.as_deref(),
        }
    }

    fn on_welcome(&mut self, nick: &str, sink: &mut impl IrcSink) {
        info!(nick = %nick, "Registered with IRC server");
        self.own_nick = nick.to_string();
        self.nick_attempts = 0;

        sink.join(&self.config.chat_channel, self.config.chat_key.as_deref());
        if let Some(management) = &self.config.management_channel {
            if !irc_eq(management, &self.config.chat_channel) {
                sink.join(management, self.config.management_key.as_deref());
            }
        }
    }

    fn on_nickname_in_use(&mut self, nick: &str, sink: &mut impl IrcSink) -> Result<(), BridgeError> {
        self.nick_attempts += 1;
        if let Some(max) = self.config.max_nick_retries {
            if self.nick_attempts > max {
                error!(nick = %nick, attempts = max, "Nickname retries exhausted");
                return Err(BridgeError::NickRetriesExhausted(max));
            }
        }

        let base = if nick.is_empty() || nick == "*" {
            self.own_nick.as_str()
        } else {
            nick
        };
        let next = format!("{base}{NICK_SUFFIX}");
        warn!(taken = %nick, next = %next, attempt = self.nick_attempts, "Nickname in use");

        self.own_nick = next;
        sink.change_nick(&self.own_nick);
        Ok(())
    }

    fn on_join(&mut self, nick: &str, channel: &str, sink: &mut impl IrcSink) -> Result<(), BridgeError> {
        let Some(role) = self.role(channel) else {
            trace!(channel = %channel, "Join in unmanaged channel");
            return Ok(());
        };

        if self.is_self(nick) {
            info!(channel = %channel, "Joined channel");
            sink.send(Command::Who(channel.to_string()));
            return Ok(());
        }

        // A fresh joiner holds no privilege in the channel it joined.
        self.observe_member(nick, false, role)
    }

    fn on_part(&mut self, nick: &str, channel: &str) -> Result<(), BridgeError> {
        let Some(role) = self.role(channel) else {
            return Ok(());
        };
        if self.is_self(nick) {
            info!(channel = %channel, "Left channel");
            return Ok(());
        }
        self.depart(nick, role)
    }

    fn on_kick(
        &mut self,
        by: &str,
        channel: &str,
        nick: &str,
        sink: &mut impl IrcSink,
    ) -> Result<(), BridgeError> {
        let Some(role) = self.role(channel) else {
            return Ok(());
        };

        if self.is_self(nick) {
            warn!(channel = %channel, by = %by, "Kicked from channel, rejoining");
            sink.join(channel, self.channel_key(role));
            return Ok(());
        }

        debug!(channel = %channel, nick = %nick, by = %by, "Member kicked");
        self.depart(nick, role)
    }

    fn on_quit(&mut self, nick: &str) -> Result<(), BridgeError> {
        if self.is_self(nick) {
            return Ok(());
        }

        let removed = self.roster.remove(nick);
        if self.bridge.is_materialized(nick) {
            self.bridge.dematerialize(nick)?;
        } else if removed.is_none() {
            return Err(BridgeError::MissingHubUser(nick.to_string()));
        }
        Ok(())
    }

    fn on_nick_change(&mut self, old: &str, new: &str) -> Result<(), BridgeError> {
        if self.is_self(old) {
            info!(old = %old, new = %new, "Own nickname changed");
            self.own_nick = new.to_string();
            return Ok(());
        }

        let tracked = self.roster.rename(old, new);
        if !self.bridge.is_materialized(old) {
            if !tracked {
                trace!(old = %old, "Nick change for untracked user");
            }
            return Ok(());
        }

        let attrs = self
            .roster
            .lookup(new)
            .map(ChannelUser::attrs)
            .unwrap_or_default();
        let hub_nick = self.bridge.rename(old, new, attrs)?;
        debug!(old = %old, new = %new, hub_nick = %hub_nick, "Hub user renamed");
        Ok(())
    }

    /// Name shown in hub chat for an IRC user.
    fn display_nick(&self, nick: &str) -> String {
        sanitize::for_hub(self.bridge.hub_nick_of(nick).unwrap_or(nick))
    }

    fn on_channel_message(&mut self, nick: &str, channel: &str, text: &str) {
        if !self.role(channel).is_some_and(ChannelRole::is_chat) || self.is_self(nick) {
            return;
        }

        let line = format!("<{}> {}", self.display_nick(nick), sanitize::for_hub(text));
        self.bridge.hub_mut().send_chat_message(&line);
    }

    fn on_action(&mut self, nick: &str, target: &str, text: &str) {
        if !self.role(target).is_some_and(ChannelRole::is_chat) || self.is_self(nick) {
            return;
        }

        let line = format!("* {} {}", self.display_nick(nick), sanitize::for_hub(text));
        let hub = self.bridge.hub_mut();
        let local = hub.local_user().to_string();
        hub.send_chat_as(&local, &line);
    }

    fn on_names(&mut self, channel: &str, names: &[String]) {
        let Some(role) = self.role(channel) else {
            trace!(channel = %channel, "NAMES for unmanaged channel");
            return;
        };

        for name in names {
            let (nick, privileged) = split_status_prefix(name);
            if nick.is_empty() || self.is_self(nick) {
                continue;
            }
            if let Err(e) = self.observe_member(nick, privileged, role) {
                warn!(channel = %channel, name = %name, error = %e, "Skipping NAMES entry");
            }
        }
    }

    fn on_who_reply(&mut self, channel: &str, nick: &str, flags: &str) -> Result<(), BridgeError> {
        let Some(role) = self.role(channel) else {
            return Ok(());
        };
        if self.is_self(nick) {
            return Ok(());
        }
        self.observe_member(nick, who_flags_privileged(flags), role)
    }

    fn on_mode(&mut self, actor: &str, target: &str, modes: &str, args: &[String]) {
        let Some(role) = self.role(target) else {
            trace!(target = %target, "Mode change outside managed channels");
            return;
        };
        if self.is_self(actor) {
            return;
        }
        if !self.is_authority(role) {
            trace!(channel = %target, modes = %modes, "Mode change in non-authority channel");
            return;
        }

        let changes = parse_privilege_modes(modes, args);
        if changes.truncated {
            warn!(
                channel = %target,
                modes = %modes,
                applied = changes.ops.len(),
                "Mode change is missing arguments, applying parsed prefix"
            );
        }

        for op in &changes.ops {
            if self.is_self(&op.nick) {
                continue;
            }
            if let Err(e) = self.apply_privilege(&op.nick, op.add) {
                warn!(channel = %target, nick = %op.nick, error = %e, "Skipping privilege change");
            }
        }
    }

    fn apply_privilege(&mut self, nick: &str, is_operator: bool) -> Result<(), BridgeError> {
        if self.roster.set_operator(nick, is_operator).is_none() {
            return Err(BridgeError::MissingRosterEntry(nick.to_string()));
        }
        if self.bridge.is_materialized(nick) {
            self.bridge.set_operator(nick, is_operator)?;
        }
        Ok(())
    }

    /// Record that `nick` is present in a channel of `role`.
    ///
    /// `privileged` only matters for the authority channel; elsewhere the
    /// existing operator flag is kept.
    fn observe_member(
        &mut self,
        nick: &str,
        privileged: bool,
        role: ChannelRole,
    ) -> Result<(), BridgeError> {
        let previous = self
            .roster
            .lookup(nick)
            .map(ChannelUser::attrs)
            .unwrap_or_default();

        let attrs = UserAttrs {
            is_management_member: previous.is_management_member || role.is_management(),
            is_operator: if self.is_authority(role) {
                privileged
            } else {
                previous.is_operator
            },
        };

        self.roster.upsert(ChannelUser::new(nick, attrs)?, true);
        self.sync_hub_user(nick, attrs, role.is_chat())
    }

    /// Bring the hub user for `nick` in line with `attrs`.
    fn sync_hub_user(
        &mut self,
        nick: &str,
        attrs: UserAttrs,
        in_chat: bool,
    ) -> Result<(), BridgeError> {
        if self.bridge.is_materialized(nick) {
            self.bridge.set_operator(nick, attrs.is_operator)?;
            self.bridge.set_management(nick, attrs.is_management_member)?;
        } else if in_chat {
            self.bridge.materialize(nick, attrs)?;
        }
        Ok(())
    }

    /// Handle `nick` leaving a channel of `role`.
    fn depart(&mut self, nick: &str, role: ChannelRole) -> Result<(), BridgeError> {
        if role.is_management() {
            self.roster.set_management(nick, false);
            if self.is_authority(role) {
                self.roster.set_operator(nick, false);
            }
        }

        let attrs = self.roster.lookup(nick).map(ChannelUser::attrs);
        let still_in_chat = !role.is_chat() && self.bridge.is_materialized(nick);
        let still_managed = attrs.is_some_and(|a| a.is_management_member);

        if !still_in_chat && !still_managed {
            self.roster.remove(nick);
        }

        if role.is_chat() {
            self.bridge.dematerialize(nick)?;
        } else if let (true, Some(attrs)) = (still_in_chat, attrs) {
            self.sync_hub_user(nick, attrs, false)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::MemoryHub;
    use crate::sink::RecordingSink;

    fn chat_only() -> RouterConfig {
        RouterConfig {
            nickname: "Bridge".into(),
            chat_channel: "#dc".into(),
            ..RouterConfig::default()
        }
    }

    fn dual() -> RouterConfig {
        RouterConfig {
            management_channel: Some("#ops".into()),
            management_key: Some("opkey".into()),
            chat_key: Some("chatkey".into()),
            ..chat_only()
        }
    }

    fn router(config: RouterConfig) -> (EventRouter<MemoryHub>, RecordingSink) {
        (EventRouter::new(config, MemoryHub::new("Hub")), RecordingSink::new())
    }

    fn join(nick: &str, channel: &str) -> Event {
        Event::Join {
            nick: nick.into(),
            channel: channel.into(),
        }
    }

    fn part(nick: &str, channel: &str) -> Event {
        Event::Part {
            nick: nick.into(),
            channel: channel.into(),
            reason: None,
        }
    }

    fn names(channel: &str, list: &str) -> Event {
        Event::NamesReply {
            channel: channel.into(),
            names: list.split_whitespace().map(str::to_string).collect(),
        }
    }

    fn mode(channel: &str, modes: &str, args: &[&str]) -> Event {
        Event::Mode {
            actor: "chanserv".into(),
            target: channel.into(),
            modes: modes.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn ops(r: &EventRouter<MemoryHub>) -> Vec<String> {
        r.bridge()
            .hub()
            .operators()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_welcome_joins_channels() {
        let (mut r, mut sink) = router(dual());
        r.handle(Event::Welcome { nick: "Bridge_".into() }, &mut sink)
            .unwrap();

        assert_eq!(r.own_nick(), "Bridge_");
        assert_eq!(
            sink.take(),
            vec![
                Command::join("#dc", Some("chatkey".into())),
                Command::join("#ops", Some("opkey".into())),
            ]
        );
    }

    #[test]
    fn test_welcome_single_channel() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(Event::Welcome { nick: "Bridge".into() }, &mut sink)
            .unwrap();
        assert_eq!(sink.take(), vec![Command::join("#dc", None)]);
    }

    #[test]
    fn test_nickname_in_use_appends_suffix() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(Event::NicknameInUse { nick: "Bridge".into() }, &mut sink)
            .unwrap();
        r.handle(Event::NicknameInUse { nick: "Bridge_".into() }, &mut sink)
            .unwrap();

        assert_eq!(r.own_nick(), "Bridge__");
        assert_eq!(
            sink.take(),
            vec![
                Command::Nick("Bridge_".into()),
                Command::Nick("Bridge__".into()),
            ]
        );
    }

    #[test]
    fn test_nickname_retry_cap() {
        let config = RouterConfig {
            max_nick_retries: Some(1),
            ..chat_only()
        };
        let (mut r, mut sink) = router(config);
        r.handle(Event::NicknameInUse { nick: "Bridge".into() }, &mut sink)
            .unwrap();
        let err = r
            .handle(Event::NicknameInUse { nick: "Bridge_".into() }, &mut sink)
            .unwrap_err();

        assert!(matches!(err, BridgeError::NickRetriesExhausted(1)));
        assert_eq!(sink.take().len(), 1);
    }

    #[test]
    fn test_names_snapshot_materializes_members() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(names("#dc", "@alice +bob carol"), &mut sink).unwrap();

        assert_eq!(r.roster().len(), 3);
        assert_eq!(r.bridge().len(), 3);
        for nick in ["alice", "bob", "carol"] {
            assert!(r.bridge().hub().contains_nick(nick));
        }
        assert_eq!(ops(&r), vec!["alice"]);
        assert_eq!(r.bridge().hub().oplist_broadcasts(), 1);
        assert!(!r.roster().lookup("bob").unwrap().is_operator());
    }

    #[test]
    fn test_repeated_names_refreshes_flags() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(names("#dc", "@alice bob"), &mut sink).unwrap();
        r.handle(names("#dc", "alice %bob"), &mut sink).unwrap();

        assert_eq!(r.bridge().len(), 2);
        assert_eq!(ops(&r), vec!["bob"]);
        assert!(!r.roster().lookup("alice").unwrap().is_operator());
    }

    #[test]
    fn test_departure_removes_from_roster_and_hub() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(names("#dc", "@alice carol"), &mut sink).unwrap();
        let broadcasts = r.bridge().hub().oplist_broadcasts();

        r.handle(part("carol", "#dc"), &mut sink).unwrap();
        assert!(!r.roster().contains("carol"));
        assert!(!r.bridge().hub().contains_nick("carol"));
        assert_eq!(r.bridge().hub().oplist_broadcasts(), broadcasts);

        r.handle(part("alice", "#dc"), &mut sink).unwrap();
        assert!(r.roster().is_empty());
        assert!(ops(&r).is_empty());
        assert_eq!(r.bridge().hub().oplist_broadcasts(), broadcasts + 1);
    }

    #[test]
    fn test_departure_of_unknown_user_is_reported() {
        let (mut r, mut sink) = router(chat_only());
        let err = r.handle(part("ghost", "#dc"), &mut sink).unwrap_err();
        assert!(matches!(err, BridgeError::MissingHubUser(_)));
        assert!(r.roster().is_empty());
    }

    #[test]
    fn test_mode_toggles() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(names("#dc", "alice @bob"), &mut sink).unwrap();
        let broadcasts = r.bridge().hub().oplist_broadcasts();

        r.handle(mode("#dc", "+o-h", &["alice", "bob"]), &mut sink)
            .unwrap();
        assert_eq!(ops(&r), vec!["alice"]);
        assert_eq!(r.bridge().hub().oplist_broadcasts(), broadcasts + 2);
        assert!(r.roster().lookup("alice").unwrap().is_operator());
        assert!(!r.roster().lookup("bob").unwrap().is_operator());
    }

    #[test]
    fn test_mode_rebroadcasts_once_per_toggle() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(names("#dc", "alice bob"), &mut sink).unwrap();

        // Non-privilege letters neither consume arguments nor rebroadcast.
        r.handle(mode("#dc", "+mvo", &["bob", "alice"]), &mut sink)
            .unwrap();
        assert_eq!(r.bridge().hub().oplist_broadcasts(), 1);
        assert_eq!(ops(&r), vec!["bob"]);

        // Already an operator: no change, no rebroadcast.
        r.handle(mode("#dc", "+o", &["bob"]), &mut sink).unwrap();
        assert_eq!(r.bridge().hub().oplist_broadcasts(), 1);
    }

    #[test]
    fn test_mode_missing_arguments_applies_prefix() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(names("#dc", "alice bob carol"), &mut sink).unwrap();

        r.handle(mode("#dc", "+ooo", &["alice", "bob"]), &mut sink)
            .unwrap();
        assert_eq!(ops(&r), vec!["alice", "bob"]);
        assert!(!r.roster().lookup("carol").unwrap().is_operator());
    }

    #[test]
    fn test_demote_then_promote_ends_promoted() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(names("#dc", "@alice"), &mut sink).unwrap();
        r.handle(mode("#dc", "-o+o", &["alice", "alice"]), &mut sink)
            .unwrap();
        assert_eq!(ops(&r), vec!["alice"]);
    }

    #[test]
    fn test_case_insensitive_tracking() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(join("Alice", "#DC"), &mut sink).unwrap();
        r.handle(mode("#dc", "+o", &["ALICE"]), &mut sink).unwrap();
        assert_eq!(ops(&r), vec!["Alice"]);

        r.handle(part("alice", "#dc"), &mut sink).unwrap();
        assert!(r.roster().is_empty());
        assert!(r.bridge().is_empty());
    }

    #[test]
    fn test_own_events_are_ignored() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(join("bridge", "#dc"), &mut sink).unwrap();
        assert_eq!(sink.take(), vec![Command::Who("#dc".into())]);

        r.handle(names("#dc", "@Bridge alice"), &mut sink).unwrap();
        assert_eq!(r.roster().len(), 1);
        assert!(!r.bridge().is_materialized("Bridge"));

        let mut rx = r.bridge().hub().subscribe();
        r.handle(
            Event::ChannelMessage {
                nick: "Bridge".into(),
                channel: "#dc".into(),
                text: "echo".into(),
            },
            &mut sink,
        )
        .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unmanaged_channel_is_dropped() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(join("alice", "#elsewhere"), &mut sink).unwrap();
        r.handle(names("#elsewhere", "@bob"), &mut sink).unwrap();
        r.handle(mode("#elsewhere", "+o", &["alice"]), &mut sink)
            .unwrap();

        assert!(r.roster().is_empty());
        assert!(r.bridge().is_empty());
    }

    #[test]
    fn test_dual_channel_authority() {
        let (mut r, mut sink) = router(dual());
        r.handle(names("#dc", "@alice bob"), &mut sink).unwrap();
        // Privilege in the chat channel does not count.
        assert!(ops(&r).is_empty());

        r.handle(names("#ops", "@alice dave"), &mut sink).unwrap();
        assert_eq!(ops(&r), vec!["alice"]);
        assert!(r.bridge().lookup("alice").unwrap().is_management_member());
        // In the management channel only: tracked but not on the hub.
        assert!(r.roster().lookup("dave").unwrap().is_management_member());
        assert!(!r.bridge().is_materialized("dave"));

        r.handle(mode("#dc", "+o", &["bob"]), &mut sink).unwrap();
        assert_eq!(ops(&r), vec!["alice"]);

        r.handle(join("dave", "#dc"), &mut sink).unwrap();
        assert!(r.bridge().lookup("dave").unwrap().is_management_member());

        r.handle(part("alice", "#ops"), &mut sink).unwrap();
        assert!(ops(&r).is_empty());
        let alice = r.bridge().lookup("alice").unwrap();
        assert!(!alice.is_management_member());
        assert!(r.roster().contains("alice"));

        r.handle(part("dave", "#dc"), &mut sink).unwrap();
        assert!(!r.bridge().is_materialized("dave"));
        assert!(r.roster().contains("dave"));
    }

    #[test]
    fn test_operator_in_management_joins_chat() {
        let (mut r, mut sink) = router(dual());
        r.handle(names("#ops", "@erin"), &mut sink).unwrap();
        assert!(r.bridge().is_empty());

        r.handle(join("erin", "#dc"), &mut sink).unwrap();
        assert_eq!(ops(&r), vec!["erin"]);
    }

    #[test]
    fn test_channel_message_and_action() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(join("alice", "#dc"), &mut sink).unwrap();
        let mut rx = r.bridge().hub().subscribe();

        r.handle(
            Event::ChannelMessage {
                nick: "alice".into(),
                channel: "#dc".into(),
                text: "costs $5 | cheap".into(),
            },
            &mut sink,
        )
        .unwrap();
        r.handle(
            Event::Action {
                nick: "alice".into(),
                target: "#dc".into(),
                text: "waves".into(),
            },
            &mut sink,
        )
        .unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            "<alice> costs &#36;5 &#124; cheap|"
        );
        assert_eq!(rx.try_recv().unwrap(), "<Hub> * alice waves|");
    }

    #[test]
    fn test_nick_change_moves_hub_user() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(names("#dc", "@bob"), &mut sink).unwrap();
        r.handle(
            Event::NickChange {
                old: "bob".into(),
                new: "robert".into(),
            },
            &mut sink,
        )
        .unwrap();

        assert!(!r.roster().contains("bob"));
        assert!(r.roster().lookup("robert").unwrap().is_operator());
        assert_eq!(ops(&r), vec!["robert"]);
    }

    #[test]
    fn test_own_nick_change() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(
            Event::NickChange {
                old: "Bridge".into(),
                new: "Bridge2".into(),
            },
            &mut sink,
        )
        .unwrap();
        assert_eq!(r.own_nick(), "Bridge2");
        assert!(r.bridge().is_empty());
    }

    #[test]
    fn test_quit_and_kick() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(names("#dc", "alice bob"), &mut sink).unwrap();

        r.handle(
            Event::Quit {
                nick: "alice".into(),
                reason: Some("bye".into()),
            },
            &mut sink,
        )
        .unwrap();
        r.handle(
            Event::Kick {
                by: "op".into(),
                channel: "#dc".into(),
                nick: "bob".into(),
            },
            &mut sink,
        )
        .unwrap();

        assert!(r.roster().is_empty());
        assert!(r.bridge().is_empty());
    }

    #[test]
    fn test_kicked_bridge_rejoins() {
        let (mut r, mut sink) = router(dual());
        r.handle(
            Event::Kick {
                by: "op".into(),
                channel: "#ops".into(),
                nick: "Bridge".into(),
            },
            &mut sink,
        )
        .unwrap();
        assert_eq!(sink.take(), vec![Command::join("#ops", Some("opkey".into()))]);
    }

    #[test]
    fn test_who_reply_refreshes_operator() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(join("alice", "#dc"), &mut sink).unwrap();
        r.handle(
            Event::WhoReply {
                channel: "#dc".into(),
                nick: "alice".into(),
                flags: "H@".into(),
            },
            &mut sink,
        )
        .unwrap();
        assert_eq!(ops(&r), vec!["alice"]);

        r.handle(
            Event::WhoReply {
                channel: "#dc".into(),
                nick: "alice".into(),
                flags: "G".into(),
            },
            &mut sink,
        )
        .unwrap();
        assert!(ops(&r).is_empty());
    }

    #[test]
    fn test_ping_answered() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(Event::Ping { token: "irc.example.net".into() }, &mut sink)
            .unwrap();
        assert_eq!(sink.take(), vec![Command::Pong("irc.example.net".into())]);
    }

    #[test]
    fn test_handle_raw_message() {
        let (mut r, mut sink) = router(chat_only());
        let msg: Message = ":alice!a@example.net JOIN #dc".parse().unwrap();
        r.handle_message(&msg, &mut sink).unwrap();
        assert!(r.bridge().is_materialized("alice"));
    }

    #[test]
    fn test_relay_tick_and_reset() {
        let (mut r, mut sink) = router(chat_only());
        r.handle(names("#dc", "@alice bob"), &mut sink).unwrap();
        r.bridge_mut().hub_mut().deliver_private("bob", "hello");

        let stats = r.relay_tick(&mut sink);
        assert_eq!(stats.chunks, 1);
        assert_eq!(sink.take(), vec![Command::privmsg("bob", "hello")]);

        assert_eq!(r.stats().hub_users, 2);
        assert_eq!(r.reset(), 2);
        assert_eq!(
            r.stats(),
            BridgeStats {
                nickname: "Bridge".into(),
                ..BridgeStats::default()
            }
        );
    }
}
