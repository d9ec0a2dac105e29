//! Text escaping at the IRC/hub boundary.
//!
//! The hub protocol terminates every command with `|` and uses `$` as a
//! field separator, so hub text carries those two characters as the numeric
//! entities `&#124;` and `&#36;`. IRC is line-oriented, so CR and LF must
//! never reach either side.

/// The hub's message terminator.
pub const HUB_TERMINATOR: char = '|';

/// Entity for `$` in hub text.
pub const DOLLAR_ENTITY: &str = "&#36;";

/// Entity for `|` in hub text.
pub const PIPE_ENTITY: &str = "&#124;";

/// Convert hub text into an IRC payload.
///
/// Strips CR, LF and raw terminators, then turns the `$`/`|` entities back
/// into literal characters.
#[must_use]
pub fn for_irc(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|&c| !matches!(c, '\r' | '\n' | HUB_TERMINATOR))
        .collect();
    stripped
        .replace(DOLLAR_ENTITY, "$")
        .replace(PIPE_ENTITY, "|")
}

/// Convert IRC text into a hub chat payload.
///
/// Strips CR and LF and escapes `$` and `|` so the text cannot terminate or
/// split the hub command it is embedded in.
#[must_use]
pub fn for_hub(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\r' | '\n' => {}
            '$' => out.push_str(DOLLAR_ENTITY),
            HUB_TERMINATOR => out.push_str(PIPE_ENTITY),
            c => out.push(c),
        }
    }
    out
}

/// Check whether text still holds anything the hub treats as reserved.
#[must_use]
pub fn has_reserved(text: &str) -> bool {
    text.contains(['\r', '\n', HUB_TERMINATOR])
        || text.contains(DOLLAR_ENTITY)
        || text.contains(PIPE_ENTITY)
}
