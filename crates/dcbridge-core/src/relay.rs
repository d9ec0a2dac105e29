//! Outbound relay from hub users to IRC.
//!
//! Hub peers append text to a synthetic user's buffer at any rate. Each
//! relay tick sends at most one chunk per user, so a large backlog drains
//! over several ticks instead of flooding the IRC connection at once.

use crate::bridge::HubUserBridge;
use crate::hub::HubCore;
use crate::sanitize::{self, DOLLAR_ENTITY, HUB_TERMINATOR, PIPE_ENTITY};
use crate::sink::IrcSink;
use dcbridge_protocol::MAX_LINE_LEN;
use tracing::{trace, warn};

/// Maximum characters per relayed IRC message.
pub const CHUNK_LIMIT: usize = 400;

/// Bytes of a `PRIVMSG <target> :<text>\r\n` line outside the text.
const PRIVMSG_OVERHEAD: usize = "PRIVMSG ".len() + " :".len() + "\r\n".len();

/// Largest text, in bytes, that fits in one PRIVMSG line to `target`.
#[must_use]
pub fn text_budget(target: &str) -> usize {
    MAX_LINE_LEN.saturating_sub(PRIVMSG_OVERHEAD + target.len())
}

/// Remove and return a prefix of `buffer` of at most `char_limit`
/// characters and `byte_limit` bytes.
///
/// Returns `None` if nothing fits. Splits only on character boundaries and
/// never inside a `&#36;`/`&#124;` entity, so sanitizing the chunks one by
/// one gives the same text as sanitizing the whole buffer.
pub fn take_chunk(buffer: &mut String, char_limit: usize, byte_limit: usize) -> Option<String> {
    let mut split = 0;
    for (idx, c) in buffer.char_indices().take(char_limit) {
        let end = idx + c.len_utf8();
        if end > byte_limit {
            break;
        }
        split = end;
    }

    if split < buffer.len() {
        split = entity_safe_split(buffer, split);
    }
    if split == 0 {
        return None;
    }

    let rest = buffer.split_off(split);
    Some(std::mem::replace(buffer, rest))
}

/// Move `split` back to the `&` of an entity it would cut in two.
fn entity_safe_split(buffer: &str, split: usize) -> usize {
    let head = &buffer[..split];
    let Some(amp) = head.rfind('&') else {
        return split;
    };
    if amp == 0 {
        return split;
    }

    // Stripped characters vanish before entities are reversed.
    let tail: String = head[amp..]
        .chars()
        .filter(|&c| !matches!(c, '\r' | '\n' | HUB_TERMINATOR))
        .collect();
    let cuts_entity = [DOLLAR_ENTITY, PIPE_ENTITY]
        .iter()
        .any(|entity| tail.len() < entity.len() && entity.starts_with(tail.as_str()));

    if cuts_entity {
        amp
    } else {
        split
    }
}

/// Relay statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Chunks sent on the last tick.
    pub chunks: usize,
    /// Characters sent on the last tick, before sanitization.
    pub chars: usize,
}

/// Tick-driven drain of synthetic users' outbound buffers.
#[derive(Debug, Clone)]
pub struct OutboundRelay {
    chunk_limit: usize,
}

impl Default for OutboundRelay {
    fn default() -> Self {
        Self::new(CHUNK_LIMIT)
    }
}

impl OutboundRelay {
    /// Create a relay with the given per-message limit.
    ///
    /// The limit is clamped to [`CHUNK_LIMIT`].
    #[must_use]
    pub fn new(chunk_limit: usize) -> Self {
        Self {
            chunk_limit: chunk_limit.clamp(1, CHUNK_LIMIT),
        }
    }

    /// Per-message character limit.
    #[must_use]
    pub fn chunk_limit(&self) -> usize {
        self.chunk_limit
    }

    /// Send one chunk for every materialized user with pending text.
    ///
    /// Chunks go to the user's IRC nickname as PRIVMSG, sanitized by the
    /// sink, and are sized so the whole line stays within [`MAX_LINE_LEN`]
    /// bytes. A chunk that sanitizes to nothing is consumed without sending.
    pub fn tick<H: HubCore>(
        &self,
        bridge: &mut HubUserBridge<H>,
        sink: &mut impl IrcSink,
    ) -> RelayStats {
        let mut stats = RelayStats::default();
        let (hub_nicks, hub) = bridge.relay_parts();

        for hub_nick in hub_nicks {
            let Some(user) = hub.lookup_synthetic_user_mut(hub_nick) else {
                continue;
            };
            if user.outgoing().is_empty() {
                continue;
            }

            let budget = text_budget(user.irc_nick());
            let Some(chunk) = take_chunk(user.outgoing_mut(), self.chunk_limit, budget) else {
                warn!(nick = %user.irc_nick(), budget, "Pending text does not fit in a PRIVMSG");
                continue;
            };

            trace!(nick = %user.irc_nick(), len = chunk.len(), "Relaying chunk");
            stats.chars += chunk.chars().count();
            if sanitize::for_irc(&chunk).is_empty() {
                continue;
            }
            sink.send_message(user.irc_nick(), &chunk);
            stats.chunks += 1;
        }

        stats
    }
}
