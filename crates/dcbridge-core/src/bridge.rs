//! Materialization of IRC members as synthetic hub users.
//!
//! [`HubUserBridge`] is the only writer of the hub directory and operator
//! set on the bridge's behalf. It keeps a tracking map from folded IRC
//! nickname to hub nickname so later events can find the user it created.

use crate::hub::{HubCore, SyntheticHubUser};
use crate::roster::{validate_nick, RosterError, UserAttrs};
use dcbridge_protocol::{irc_to_lower, ProtocolError};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Suffix appended to a colliding hub nickname.
pub const NICK_SUFFIX: char = '_';

/// Highest numeric suffix tried after the plain suffix also collides.
pub const MAX_NUMERIC_SUFFIX: u32 = 99;

/// Bridge errors.
///
/// None of these are fatal: the event router logs them and moves on to the
/// next event.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// An operation expected a materialized hub user that does not exist.
    #[error("No hub user for IRC nick {0}")]
    MissingHubUser(String),

    /// An operation expected a roster entry that does not exist.
    #[error("Not in roster: {0}")]
    MissingRosterEntry(String),

    /// Every candidate hub nickname is already taken.
    #[error("No free hub nickname for {0}")]
    NickUnavailable(String),

    /// The bridge's own nickname could not be registered.
    #[error("Gave up on nickname after {0} attempts")]
    NickRetriesExhausted(u32),

    /// Invalid roster data.
    #[error(transparent)]
    Roster(#[from] RosterError),

    /// Malformed inbound message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl BridgeError {
    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::MissingHubUser(_) => "missing_hub_user",
            BridgeError::MissingRosterEntry(_) => "missing_roster_entry",
            BridgeError::NickUnavailable(_) => "nick_unavailable",
            BridgeError::NickRetriesExhausted(_) => "nick_retries_exhausted",
            BridgeError::Roster(_) => "roster",
            BridgeError::Protocol(_) => "protocol",
        }
    }
}

/// Creates, updates and removes synthetic hub users.
#[derive(Debug)]
pub struct HubUserBridge<H> {
    hub: H,
    /// Folded IRC nickname to hub nickname, in materialization order.
    materialized: IndexMap<String, String>,
}

impl<H: HubCore> HubUserBridge<H> {
    /// Create a bridge driving `hub`.
    #[must_use]
    pub fn new(hub: H) -> Self {
        Self {
            hub,
            materialized: IndexMap::new(),
        }
    }

    /// The hub core.
    #[must_use]
    pub fn hub(&self) -> &H {
        &self.hub
    }

    /// The hub core, mutably.
    pub fn hub_mut(&mut self) -> &mut H {
        &mut self.hub
    }

    /// Number of materialized users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.materialized.len()
    }

    /// Check if nothing is materialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materialized.is_empty()
    }

    /// Check if an IRC nickname has a hub user.
    #[must_use]
    pub fn is_materialized(&self, irc_nick: &str) -> bool {
        self.materialized.contains_key(&irc_to_lower(irc_nick))
    }

    /// Hub nickname for an IRC nickname.
    #[must_use]
    pub fn hub_nick_of(&self, irc_nick: &str) -> Option<&str> {
        self.materialized
            .get(&irc_to_lower(irc_nick))
            .map(String::as_str)
    }

    /// Synthetic user for an IRC nickname.
    #[must_use]
    pub fn lookup(&self, irc_nick: &str) -> Option<&SyntheticHubUser> {
        let hub_nick = self.hub_nick_of(irc_nick)?;
        self.hub.lookup_synthetic_user(hub_nick)
    }

    /// Tracked hub nicknames alongside the hub, for the relay.
    pub(crate) fn relay_parts(&mut self) -> (impl Iterator<Item = &String>, &mut H) {
        (self.materialized.values(), &mut self.hub)
    }

    /// Pick a free hub nickname for `nick`.
    ///
    /// Tries the nickname itself, then with [`NICK_SUFFIX`] appended, then
    /// with numbered suffixes up to [`MAX_NUMERIC_SUFFIX`].
    #[must_use]
    pub fn resolve_hub_nick(&self, nick: &str) -> Option<String> {
        if !self.hub.contains_nick(nick) {
            return Some(nick.to_string());
        }

        let suffixed = format!("{nick}{NICK_SUFFIX}");
        if !self.hub.contains_nick(&suffixed) {
            return Some(suffixed);
        }

        (2..=MAX_NUMERIC_SUFFIX)
            .map(|n| format!("{nick}{NICK_SUFFIX}{n}"))
            .find(|candidate| !self.hub.contains_nick(candidate))
    }

    /// Ensure a synthetic hub user exists for `nick`.
    ///
    /// Registers the user, announces `$Hello` and `$MyINFO`, and adds it to
    /// the operator set (with one rebroadcast) when `attrs.is_operator`.
    /// Returns the hub nickname. Materializing an already materialized
    /// nickname is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the nickname is invalid or no hub nickname is free.
    pub fn materialize(&mut self, nick: &str, attrs: UserAttrs) -> Result<String, BridgeError> {
        validate_nick(nick)?;
        let key = irc_to_lower(nick);

        if let Some(hub_nick) = self.materialized.get(&key) {
            return Ok(hub_nick.clone());
        }

        let hub_nick = self
            .resolve_hub_nick(nick)
            .ok_or_else(|| BridgeError::NickUnavailable(nick.to_string()))?;
        if hub_nick != nick {
            debug!(nick = %nick, hub_nick = %hub_nick, "Hub nickname taken, using suffix");
        }

        let user = SyntheticHubUser::new(nick, hub_nick.clone(), attrs);
        info!(nick = %nick, hub_nick = %hub_nick, id = %user.idstring(), operator = attrs.is_operator, "Materialized IRC user");

        self.hub.register_user(user);
        self.hub.announce_hello(&hub_nick, true);
        self.hub.announce_info(&hub_nick);

        if attrs.is_operator && self.hub.add_operator(&hub_nick) {
            self.hub.rebroadcast_operator_list();
        }

        self.materialized.insert(key, hub_nick.clone());
        Ok(hub_nick)
    }

    /// Propagate a privilege change to the operator set.
    ///
    /// Returns `true` if the set changed, in which case exactly one
    /// `$OpList` rebroadcast was issued.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MissingHubUser`] if `nick` is not materialized.
    pub fn set_operator(&mut self, nick: &str, is_operator: bool) -> Result<bool, BridgeError> {
        let hub_nick = self
            .hub_nick_of(nick)
            .ok_or_else(|| BridgeError::MissingHubUser(nick.to_string()))?
            .to_string();

        let user = self
            .hub
            .lookup_synthetic_user_mut(&hub_nick)
            .ok_or_else(|| BridgeError::MissingHubUser(nick.to_string()))?;
        user.set_operator(is_operator);

        let changed = if is_operator {
            self.hub.add_operator(&hub_nick)
        } else {
            self.hub.remove_operator(&hub_nick)
        };

        if changed {
            debug!(nick = %nick, hub_nick = %hub_nick, operator = is_operator, "Operator set changed");
            self.hub.rebroadcast_operator_list();
        }
        Ok(changed)
    }

    /// Update the management flag and re-announce `$MyINFO` if it changed.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MissingHubUser`] if `nick` is not materialized.
    pub fn set_management(
        &mut self,
        nick: &str,
        is_management_member: bool,
    ) -> Result<bool, BridgeError> {
        let hub_nick = self
            .hub_nick_of(nick)
            .ok_or_else(|| BridgeError::MissingHubUser(nick.to_string()))?
            .to_string();

        let user = self
            .hub
            .lookup_synthetic_user_mut(&hub_nick)
            .ok_or_else(|| BridgeError::MissingHubUser(nick.to_string()))?;

        if user.is_management_member() == is_management_member {
            return Ok(false);
        }
        user.set_management_member(is_management_member);
        self.hub.announce_info(&hub_nick);
        Ok(true)
    }

    /// Remove the synthetic user for `nick`.
    ///
    /// The operator list is rebroadcast only if the user was an operator.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MissingHubUser`] if `nick` has no hub user.
    pub fn dematerialize(&mut self, nick: &str) -> Result<SyntheticHubUser, BridgeError> {
        let hub_nick = self
            .materialized
            .shift_remove(&irc_to_lower(nick))
            .ok_or_else(|| BridgeError::MissingHubUser(nick.to_string()))?;

        let was_operator = self.hub.is_operator(&hub_nick);
        let user = self
            .hub
            .unregister_user(&hub_nick)
            .ok_or_else(|| BridgeError::MissingHubUser(nick.to_string()))?;

        if was_operator {
            self.hub.rebroadcast_operator_list();
        }
        info!(nick = %nick, hub_nick = %hub_nick, "Removed IRC user from hub");
        Ok(user)
    }

    /// Replace the synthetic user for `old` with one for `new`.
    ///
    /// Pending outbound text moves to the new user. If `new` cannot be
    /// materialized the old user stays removed and its pending text is
    /// dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if `old` is not materialized or `new` cannot be.
    pub fn rename(&mut self, old: &str, new: &str, attrs: UserAttrs) -> Result<String, BridgeError> {
        validate_nick(new)?;
        let previous = self.dematerialize(old)?;
        let hub_nick = match self.materialize(new, attrs) {
            Ok(hub_nick) => hub_nick,
            Err(e) => {
                if !previous.outgoing().is_empty() {
                    warn!(
                        old = %old,
                        new = %new,
                        discarded_bytes = previous.outgoing().len(),
                        "Dropped pending hub text after failed rename"
                    );
                }
                return Err(e);
            }
        };

        if !previous.outgoing().is_empty() {
            if let Some(user) = self.hub.lookup_synthetic_user_mut(&hub_nick) {
                user.push_outgoing(previous.outgoing());
            }
        }
        Ok(hub_nick)
    }

    /// Remove every synthetic user, e.g. after the IRC connection drops.
    ///
    /// Returns the number of users removed.
    pub fn dematerialize_all(&mut self) -> usize {
        let nicks: Vec<String> = self.materialized.keys().cloned().collect();
        let mut removed = 0;
        for nick in nicks {
            match self.dematerialize(&nick) {
                Ok(_) => removed += 1,
                Err(e) => warn!(nick = %nick, error = %e, "Failed to remove hub user"),
            }
        }
        removed
    }
}
