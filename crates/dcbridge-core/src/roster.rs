//! Channel roster tracking.
//!
//! The roster is the bridge's authoritative view of who is in the managed
//! channels and what authority they hold. Entries are keyed by the
//! RFC 1459-folded nickname, so `Alice` and `alice` are the same member.

use dcbridge_protocol::irc_to_lower;
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Roster errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RosterError {
    /// Nickname is empty or contains characters IRC forbids.
    #[error("Invalid nickname: {0:?}")]
    InvalidNick(String),
}

/// Authority flags carried by a roster entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserAttrs {
    /// Member of the management channel.
    pub is_management_member: bool,
    /// Holds channel privilege (`~`, `&`, `@` or `%`) in the authority channel.
    pub is_operator: bool,
}

impl UserAttrs {
    /// Attributes for a plain chat member.
    #[must_use]
    pub fn member() -> Self {
        Self::default()
    }

    /// Attributes for a privileged member.
    #[must_use]
    pub fn operator() -> Self {
        Self {
            is_management_member: false,
            is_operator: true,
        }
    }

    /// Set the management flag.
    #[must_use]
    pub fn with_management(mut self, is_management_member: bool) -> Self {
        self.is_management_member = is_management_member;
        self
    }
}

/// A single channel member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelUser {
    nick: String,
    #[serde(flatten)]
    attrs: UserAttrs,
}

/// Check that a nickname can appear on the wire.
///
/// # Errors
///
/// Returns [`RosterError::InvalidNick`] for empty names or names containing
/// whitespace, commas, control characters, or a leading `#`/`:`.
pub fn validate_nick(nick: &str) -> Result<(), RosterError> {
    let invalid = nick.is_empty()
        || nick.starts_with(['#', ':', '&'])
        || nick
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == ',');
    if invalid {
        return Err(RosterError::InvalidNick(nick.to_string()));
    }
    Ok(())
}

impl ChannelUser {
    /// Create a validated roster entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the nickname is not valid.
    pub fn new(nick: impl Into<String>, attrs: UserAttrs) -> Result<Self, RosterError> {
        let nick = nick.into();
        validate_nick(&nick)?;
        Ok(Self { nick, attrs })
    }

    /// Nickname as last observed.
    #[must_use]
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Authority flags.
    #[must_use]
    pub fn attrs(&self) -> UserAttrs {
        self.attrs
    }

    /// Member of the management channel.
    #[must_use]
    pub fn is_management_member(&self) -> bool {
        self.attrs.is_management_member
    }

    /// Holds channel privilege.
    #[must_use]
    pub fn is_operator(&self) -> bool {
        self.attrs.is_operator
    }
}

/// Ordered, case-insensitive set of channel members.
#[derive(Debug, Default)]
pub struct ChannelRoster {
    /// Folded nickname to entry, in insertion order.
    members: IndexMap<String, ChannelUser>,
}

impl ChannelRoster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a nickname is present.
    #[must_use]
    pub fn contains(&self, nick: &str) -> bool {
        self.members.contains_key(&irc_to_lower(nick))
    }

    /// Look up a member by nickname.
    #[must_use]
    pub fn lookup(&self, nick: &str) -> Option<&ChannelUser> {
        self.members.get(&irc_to_lower(nick))
    }

    /// Insert a member if absent.
    ///
    /// Returns `true` if the member is new. An existing entry keeps its
    /// attributes unless `refresh` is set, in which case they are replaced
    /// along with the nickname's current casing.
    pub fn upsert(&mut self, user: ChannelUser, refresh: bool) -> bool {
        let key = irc_to_lower(&user.nick);

        if let Some(existing) = self.members.get_mut(&key) {
            if refresh {
                *existing = user;
            }
            return false;
        }

        debug!(nick = %user.nick, "Roster: member added");
        self.members.insert(key, user);
        true
    }

    /// Remove a member.
    ///
    /// Returns the removed entry, if any.
    pub fn remove(&mut self, nick: &str) -> Option<ChannelUser> {
        let removed = self.members.shift_remove(&irc_to_lower(nick));
        if removed.is_some() {
            debug!(nick = %nick, "Roster: member removed");
        }
        removed
    }

    /// Set the operator flag.
    ///
    /// Returns the previous value, or `None` if the member is unknown.
    pub fn set_operator(&mut self, nick: &str, is_operator: bool) -> Option<bool> {
        let entry = self.members.get_mut(&irc_to_lower(nick))?;
        let previous = entry.attrs.is_operator;
        entry.attrs.is_operator = is_operator;
        Some(previous)
    }

    /// Set the management flag.
    ///
    /// Returns the previous value, or `None` if the member is unknown.
    pub fn set_management(&mut self, nick: &str, is_management_member: bool) -> Option<bool> {
        let entry = self.members.get_mut(&irc_to_lower(nick))?;
        let previous = entry.attrs.is_management_member;
        entry.attrs.is_management_member = is_management_member;
        Some(previous)
    }

    /// Rename a member, keeping its attributes.
    ///
    /// The entry moves to the end of the iteration order. Returns `false` if
    /// `old` is unknown or `new` is invalid. An existing entry for `new`
    /// (a stale duplicate) is replaced.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if validate_nick(new).is_err() {
            return false;
        }
        let Some(mut entry) = self.members.shift_remove(&irc_to_lower(old)) else {
            return false;
        };
        entry.nick = new.to_string();
        self.members.insert(irc_to_lower(new), entry);
        debug!(old = %old, new = %new, "Roster: member renamed");
        true
    }

    /// Iterate members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ChannelUser> {
        self.members.values()
    }

    /// Number of members holding channel privilege.
    #[must_use]
    pub fn operator_count(&self) -> usize {
        self.members.values().filter(|u| u.is_operator()).count()
    }

    /// Remove every member.
    pub fn clear(&mut self) {
        self.members.clear();
    }
}
