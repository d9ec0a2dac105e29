//! Hub-side collaborator surface.
//!
//! The bridge does not own the DC hub; it drives it through [`HubCore`].
//! [`MemoryHub`] is a self-contained implementation that keeps the user
//! directory and operator set in memory and renders every announcement as a
//! DC protocol line on a broadcast channel. The server binary runs on it,
//! and the tests observe the bridge through it.

use crate::roster::UserAttrs;
use dcbridge_protocol::irc_to_lower;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default broadcast capacity for hub lines.
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// An IRC participant mirrored into the hub directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntheticHubUser {
    idstring: String,
    irc_nick: String,
    hub_nick: String,
    is_operator: bool,
    is_management_member: bool,
    /// Text addressed to this user by hub peers, waiting for the relay.
    #[serde(skip)]
    outgoing: String,
}

impl SyntheticHubUser {
    /// Create a synthetic user for `irc_nick`, registered as `hub_nick`.
    #[must_use]
    pub fn new(irc_nick: impl Into<String>, hub_nick: impl Into<String>, attrs: UserAttrs) -> Self {
        let irc_nick = irc_nick.into();
        Self {
            idstring: format!("irc:{}", irc_to_lower(&irc_nick)),
            irc_nick,
            hub_nick: hub_nick.into(),
            is_operator: attrs.is_operator,
            is_management_member: attrs.is_management_member,
            outgoing: String::new(),
        }
    }

    /// Stable identity derived from the IRC nickname.
    #[must_use]
    pub fn idstring(&self) -> &str {
        &self.idstring
    }

    /// Nickname on the IRC side.
    #[must_use]
    pub fn irc_nick(&self) -> &str {
        &self.irc_nick
    }

    /// Nickname in the hub namespace, possibly suffixed.
    #[must_use]
    pub fn hub_nick(&self) -> &str {
        &self.hub_nick
    }

    /// Whether the user is flagged as a hub operator.
    #[must_use]
    pub fn is_operator(&self) -> bool {
        self.is_operator
    }

    /// Whether the user is in the management channel.
    #[must_use]
    pub fn is_management_member(&self) -> bool {
        self.is_management_member
    }

    /// Set the operator flag.
    pub fn set_operator(&mut self, is_operator: bool) {
        self.is_operator = is_operator;
    }

    /// Set the management flag.
    pub fn set_management_member(&mut self, is_management_member: bool) {
        self.is_management_member = is_management_member;
    }

    /// Append text to the outbound buffer.
    pub fn push_outgoing(&mut self, text: &str) {
        self.outgoing.push_str(text);
    }

    /// Pending outbound text.
    #[must_use]
    pub fn outgoing(&self) -> &str {
        &self.outgoing
    }

    /// Mutable access to the outbound buffer.
    pub fn outgoing_mut(&mut self) -> &mut String {
        &mut self.outgoing
    }
}

/// Operations the bridge needs from the hub core.
///
/// All methods are synchronous: the hub directory is owned by the bridge's
/// single event-loop task and never shared across threads.
pub trait HubCore {
    /// Hub nickname of the bridge's own identity.
    fn local_user(&self) -> &str;

    /// Inject chat attributed to `sender` into the hub chat stream.
    fn send_chat_as(&mut self, sender: &str, text: &str);

    /// Inject a preformatted chat line (`<nick> text`) issued by the
    /// bridge's own identity.
    fn send_chat_message(&mut self, text: &str);

    /// Check if a nickname is taken in the hub namespace (native or synthetic).
    fn contains_nick(&self, hub_nick: &str) -> bool;

    /// Look up a synthetic user by hub nickname.
    fn lookup_synthetic_user(&self, hub_nick: &str) -> Option<&SyntheticHubUser>;

    /// Look up a synthetic user by hub nickname, mutably.
    fn lookup_synthetic_user_mut(&mut self, hub_nick: &str) -> Option<&mut SyntheticHubUser>;

    /// Add a synthetic user to the directory.
    fn register_user(&mut self, user: SyntheticHubUser);

    /// Remove a synthetic user from the directory and the operator set.
    fn unregister_user(&mut self, hub_nick: &str) -> Option<SyntheticHubUser>;

    /// Broadcast the `$Hello` for a user.
    fn announce_hello(&mut self, hub_nick: &str, is_new: bool);

    /// Broadcast the `$MyINFO` for a user.
    fn announce_info(&mut self, hub_nick: &str);

    /// Add to the operator set. Returns `false` if already present.
    fn add_operator(&mut self, hub_nick: &str) -> bool;

    /// Remove from the operator set. Returns `false` if absent.
    fn remove_operator(&mut self, hub_nick: &str) -> bool;

    /// Check operator set membership.
    fn is_operator(&self, hub_nick: &str) -> bool;

    /// Broadcast the full `$OpList`.
    fn rebroadcast_operator_list(&mut self);
}

/// Hub statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubStats {
    /// Synthetic users in the directory.
    pub synthetic_users: usize,
    /// Entries in the operator set.
    pub operators: usize,
    /// `$OpList` broadcasts since start.
    pub oplist_broadcasts: u64,
}

/// In-memory hub directory.
#[derive(Debug)]
pub struct MemoryHub {
    local_nick: String,
    /// Hub-native nicknames (not managed by the bridge).
    native: HashSet<String>,
    /// Synthetic users by hub nickname, in registration order.
    users: IndexMap<String, SyntheticHubUser>,
    operators: IndexSet<String>,
    sender: broadcast::Sender<String>,
    oplist_broadcasts: u64,
}

impl MemoryHub {
    /// Create a hub whose own identity is `local_nick`.
    #[must_use]
    pub fn new(local_nick: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        let local_nick = local_nick.into();
        let mut native = HashSet::new();
        native.insert(local_nick.clone());
        Self {
            local_nick,
            native,
            users: IndexMap::new(),
            operators: IndexSet::new(),
            sender,
            oplist_broadcasts: 0,
        }
    }

    /// Subscribe to rendered hub protocol lines.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Register a hub-native user, occupying its nickname.
    pub fn add_native_user(&mut self, hub_nick: impl Into<String>) {
        self.native.insert(hub_nick.into());
    }

    /// Queue text from a hub peer for a synthetic user.
    ///
    /// Returns `false` if no such synthetic user exists.
    pub fn deliver_private(&mut self, hub_nick: &str, text: &str) -> bool {
        match self.users.get_mut(hub_nick) {
            Some(user) => {
                user.push_outgoing(text);
                true
            }
            None => false,
        }
    }

    /// Synthetic users in registration order.
    pub fn synthetic_users(&self) -> impl Iterator<Item = &SyntheticHubUser> {
        self.users.values()
    }

    /// Operator set in insertion order.
    #[must_use]
    pub fn operators(&self) -> Vec<&str> {
        self.operators.iter().map(String::as_str).collect()
    }

    /// Number of `$OpList` broadcasts so far.
    #[must_use]
    pub fn oplist_broadcasts(&self) -> u64 {
        self.oplist_broadcasts
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            synthetic_users: self.users.len(),
            operators: self.operators.len(),
            oplist_broadcasts: self.oplist_broadcasts,
        }
    }

    fn broadcast(&self, line: String) -> usize {
        trace!(line = %line, "Hub broadcast");
        self.sender.send(line).unwrap_or_default()
    }
}

impl HubCore for MemoryHub {
    fn local_user(&self) -> &str {
        &self.local_nick
    }

    fn send_chat_as(&mut self, sender: &str, text: &str) {
        self.broadcast(format!("<{sender}> {text}|"));
    }

    fn send_chat_message(&mut self, text: &str) {
        self.broadcast(format!("{text}|"));
    }

    fn contains_nick(&self, hub_nick: &str) -> bool {
        self.native.contains(hub_nick) || self.users.contains_key(hub_nick)
    }

    fn lookup_synthetic_user(&self, hub_nick: &str) -> Option<&SyntheticHubUser> {
        self.users.get(hub_nick)
    }

    fn lookup_synthetic_user_mut(&mut self, hub_nick: &str) -> Option<&mut SyntheticHubUser> {
        self.users.get_mut(hub_nick)
    }

    fn register_user(&mut self, user: SyntheticHubUser) {
        debug!(hub_nick = %user.hub_nick(), id = %user.idstring(), "Hub: user registered");
        self.users.insert(user.hub_nick().to_string(), user);
    }

    fn unregister_user(&mut self, hub_nick: &str) -> Option<SyntheticHubUser> {
        let user = self.users.shift_remove(hub_nick)?;
        self.operators.shift_remove(hub_nick);
        self.broadcast(format!("$Quit {hub_nick}|"));
        debug!(hub_nick = %hub_nick, "Hub: user unregistered");
        Some(user)
    }

    fn announce_hello(&mut self, hub_nick: &str, is_new: bool) {
        if is_new {
            self.broadcast(format!("$Hello {hub_nick}|"));
        }
    }

    fn announce_info(&mut self, hub_nick: &str) {
        let Some(user) = self.users.get(hub_nick) else {
            return;
        };
        let tag = if user.is_management_member() {
            "[IRC/mgmt]"
        } else {
            "[IRC]"
        };
        let line = format!(
            "$MyINFO $ALL {hub_nick} {tag} {}$ $IRC\u{1}$$0$|",
            user.irc_nick()
        );
        self.broadcast(line);
    }

    fn add_operator(&mut self, hub_nick: &str) -> bool {
        self.operators.insert(hub_nick.to_string())
    }

    fn remove_operator(&mut self, hub_nick: &str) -> bool {
        self.operators.shift_remove(hub_nick)
    }

    fn is_operator(&self, hub_nick: &str) -> bool {
        self.operators.contains(hub_nick)
    }

    fn rebroadcast_operator_list(&mut self) {
        self.oplist_broadcasts += 1;
        let mut line = String::from("$OpList ");
        for nick in &self.operators {
            line.push_str(nick);
            line.push_str("$$");
        }
        line.push('|');
        self.broadcast(line);
    }
}
