//! Channel privilege MODE parsing.
//!
//! Only the privilege letters matter to the bridge: owner (`q`), admin
//! (`a`), operator (`o`) and half-operator (`h`). Each takes a nickname
//! argument. Every other letter is skipped without consuming an argument.

/// Mode letters that grant channel privilege, compared case-insensitively.
pub const PRIVILEGE_MODES: [char; 4] = ['q', 'a', 'o', 'h'];

/// NAMES / WHO status prefixes that imply channel privilege.
pub const PRIVILEGE_PREFIXES: [char; 4] = ['~', '&', '@', '%'];

/// Every NAMES status prefix, privileged or not.
pub const STATUS_PREFIXES: [char; 5] = ['~', '&', '@', '%', '+'];

/// A single privilege change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeOp {
    /// `true` for `+`, `false` for `-`.
    pub add: bool,
    /// Target nickname.
    pub nick: String,
}

impl ModeOp {
    /// Grant privilege to `nick`.
    #[must_use]
    pub fn add(nick: impl Into<String>) -> Self {
        Self {
            add: true,
            nick: nick.into(),
        }
    }

    /// Revoke privilege from `nick`.
    #[must_use]
    pub fn remove(nick: impl Into<String>) -> Self {
        Self {
            add: false,
            nick: nick.into(),
        }
    }
}

/// Result of parsing one MODE notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeChanges {
    /// Operations in the order they appeared.
    pub ops: Vec<ModeOp>,
    /// A privilege letter had no argument left; parsing stopped there.
    pub truncated: bool,
}

/// Check if a mode letter is a privilege letter.
#[must_use]
pub fn is_privilege_mode(c: char) -> bool {
    PRIVILEGE_MODES.contains(&c.to_ascii_lowercase())
}

/// Parse a mode token string and its positional arguments.
///
/// The sign starts as `+` and flips on every `+`/`-`. Parsing stops at the
/// first privilege letter without an argument; operations already emitted
/// stay valid.
#[must_use]
pub fn parse_privilege_modes<S: AsRef<str>>(modes: &str, args: &[S]) -> ModeChanges {
    let mut changes = ModeChanges::default();
    let mut args = args.iter();
    let mut add = true;

    for c in modes.chars() {
        match c {
            '+' => add = true,
            '-' => add = false,
            c if is_privilege_mode(c) => match args.next() {
                Some(nick) => changes.ops.push(ModeOp {
                    add,
                    nick: nick.as_ref().to_string(),
                }),
                None => {
                    changes.truncated = true;
                    break;
                }
            },
            _ => {}
        }
    }

    changes
}

/// Split a NAMES entry into its nickname and privilege flag.
///
/// `@alice` → `("alice", true)`, `+bob` → `("bob", false)`. Multi-prefix
/// entries such as `@+carol` are handled.
#[must_use]
pub fn split_status_prefix(name: &str) -> (&str, bool) {
    let nick = name.trim_start_matches(STATUS_PREFIXES);
    let status = &name[..name.len() - nick.len()];
    (nick, status.contains(PRIVILEGE_PREFIXES))
}

/// Check if WHO reply flags (`H@`, `G%`, `H*~`) carry channel privilege.
#[must_use]
pub fn who_flags_privileged(flags: &str) -> bool {
    flags.contains(PRIVILEGE_PREFIXES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_remove() {
        let changes = parse_privilege_modes("+o-h", &["alice", "bob"]);
        assert_eq!(changes.ops, vec![ModeOp::add("alice"), ModeOp::remove("bob")]);
        assert!(!changes.truncated);
    }

    #[test]
    fn test_sign_carries_over() {
        let changes = parse_privilege_modes("+oo-qa", &["a", "b", "c", "d"]);
        assert_eq!(
            changes.ops,
            vec![
                ModeOp::add("a"),
                ModeOp::add("b"),
                ModeOp::remove("c"),
                ModeOp::remove("d"),
            ]
        );
    }

    #[test]
    fn test_unrecognized_letters_do_not_consume() {
        let changes = parse_privilege_modes("+mnto", &["alice"]);
        assert_eq!(changes.ops, vec![ModeOp::add("alice")]);

        let changes = parse_privilege_modes("-v+o", &["bob"]);
        assert_eq!(changes.ops, vec![ModeOp::add("bob")]);
    }

    #[test]
    fn test_uppercase_privilege_letters() {
        let changes = parse_privilege_modes("+O", &["alice"]);
        assert_eq!(changes.ops, vec![ModeOp::add("alice")]);
    }

    #[test]
    fn test_truncation_keeps_prefix() {
        let changes = parse_privilege_modes("+ooo", &["alice", "bob"]);
        assert_eq!(changes.ops, vec![ModeOp::add("alice"), ModeOp::add("bob")]);
        assert!(changes.truncated);

        let changes = parse_privilege_modes::<&str>("-h", &[]);
        assert!(changes.ops.is_empty());
        assert!(changes.truncated);
    }

    #[test]
    fn test_demote_then_promote_same_nick() {
        let changes = parse_privilege_modes("-o+o", &["alice", "Alice"]);
        assert_eq!(changes.ops.last(), Some(&ModeOp::add("Alice")));
    }

    #[test]
    fn test_split_status_prefix() {
        assert_eq!(split_status_prefix("@alice"), ("alice", true));
        assert_eq!(split_status_prefix("+bob"), ("bob", false));
        assert_eq!(split_status_prefix("carol"), ("carol", false));
        assert_eq!(split_status_prefix("%+dave"), ("dave", true));
        assert_eq!(split_status_prefix("~erin"), ("erin", true));
    }

    #[test]
    fn test_who_flags() {
        assert!(who_flags_privileged("H@"));
        assert!(who_flags_privileged("G*%"));
        assert!(!who_flags_privileged("H+"));
        assert!(!who_flags_privileged("G"));
    }
}
