//! Quelta Topic Lifecycle
//!
//! Derives a topic's lifecycle state from its display name, computes the
//! next valid name for a requested transition, and keeps the optional local
//! topic directory. The tag prefix in the title is the wire format; nothing
//! outside this crate pattern-matches bracketed prefixes.

pub mod directory;

use std::fmt;

pub use directory::{TopicDirectory, TopicRecord};

/// Lifecycle states, label spelling is canonical (`CLOSED`, not `CLOSE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicState {
    Open,
    Closed,
    PendingRefund,
    PendingFix,
}

impl TopicState {
    pub const ALL: [TopicState; 4] = [
        TopicState::Open,
        TopicState::Closed,
        TopicState::PendingRefund,
        TopicState::PendingFix,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TopicState::Open => "OPEN",
            TopicState::Closed => "CLOSED",
            TopicState::PendingRefund => "PENDING REFUND",
            TopicState::PendingFix => "PENDING FIX",
        }
    }

    /// The bracketed title prefix for this state. `OPEN` carries no tag.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            TopicState::Open => None,
            TopicState::Closed => Some("[CLOSED]"),
            TopicState::PendingRefund => Some("[PENDING REFUND]"),
            TopicState::PendingFix => Some("[PENDING FIX]"),
        }
    }

    /// Case-insensitive label parse; anything else is an unrecognized target.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_uppercase();
        TopicState::ALL
            .into_iter()
            .find(|state| state.label() == normalized)
    }

    pub fn joined_labels() -> String {
        TopicState::ALL
            .iter()
            .map(|state| state.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for TopicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Splits a display name into `(base name, state)`.
///
/// Recognizes at most one reserved tag at the start of the title,
/// case-insensitively, and trims exactly one following space. Unreserved
/// bracketed text stays in the base name; decoding never fails.
pub fn decode(title: &str) -> (String, TopicState) {
    for state in TopicState::ALL {
        let Some(tag) = state.tag() else { continue };
        let Some(prefix) = title.get(..tag.len()) else {
            continue;
        };
        if prefix.eq_ignore_ascii_case(tag) {
            let rest = &title[tag.len()..];
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            return (rest.to_string(), state);
        }
    }
    (title.to_string(), TopicState::Open)
}

/// Inverse of [`decode`] for the tag portion: `OPEN` titles are returned
/// verbatim, every other state gets its tag prefixed.
pub fn encode(base_name: &str, state: TopicState) -> String {
    match state.tag() {
        None => base_name.to_string(),
        Some(tag) => format!("{} {}", tag, base_name),
    }
}

/// Why a requested transition produced no new title.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// No-op classification, not a hard error: the title already carries
    /// the requested state.
    #[error("topic already has that state: {0}")]
    AlreadyInState(TopicState),

    /// The requested label is not one of the four lifecycle states.
    #[error("unrecognized state label: {0}")]
    UnrecognizedTarget(String),
}

/// Computes the new title for a transition of `current_title` to `requested`.
///
/// The transition graph is flat: every state may move directly to every
/// other state, and `CLOSED` is not terminal. The only rejection for a
/// valid target is [`Rejection::AlreadyInState`].
pub fn resolve_transition(current_title: &str, requested: TopicState) -> Result<String, Rejection> {
    let (base_name, current) = decode(current_title);
    if current == requested {
        return Err(Rejection::AlreadyInState(requested));
    }
    Ok(encode(&base_name, requested))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_untagged_title_is_open() {
        let (base, state) = decode("Refund request");
        assert_eq!(base, "Refund request");
        assert_eq!(state, TopicState::Open);
    }

    #[test]
    fn decode_recognizes_each_tag() {
        assert_eq!(
            decode("[CLOSED] Refund request"),
            ("Refund request".to_string(), TopicState::Closed)
        );
        assert_eq!(
            decode("[PENDING REFUND] Refund request"),
            ("Refund request".to_string(), TopicState::PendingRefund)
        );
        assert_eq!(
            decode("[PENDING FIX] Broken widget"),
            ("Broken widget".to_string(), TopicState::PendingFix)
        );
    }

    #[test]
    fn decode_is_case_insensitive() {
        let (base, state) = decode("[closed] Refund request");
        assert_eq!(base, "Refund request");
        assert_eq!(state, TopicState::Closed);
    }

    #[test]
    fn decode_strips_one_tag_and_one_space_only() {
        let (base, state) = decode("[CLOSED]  twice spaced");
        assert_eq!(base, " twice spaced");
        assert_eq!(state, TopicState::Closed);

        let (base, state) = decode("[CLOSED] [CLOSED] stacked");
        assert_eq!(base, "[CLOSED] stacked");
        assert_eq!(state, TopicState::Closed);
    }

    #[test]
    fn decode_keeps_unreserved_brackets_in_base() {
        let (base, state) = decode("[URGENT] Payment stuck");
        assert_eq!(base, "[URGENT] Payment stuck");
        assert_eq!(state, TopicState::Open);
    }

    #[test]
    fn decode_handles_multibyte_titles() {
        let (base, state) = decode("ちいさい topic");
        assert_eq!(base, "ちいさい topic");
        assert_eq!(state, TopicState::Open);
    }

    #[test]
    fn codec_round_trips_every_state() {
        for state in TopicState::ALL {
            let encoded = encode("Widget issue", state);
            assert_eq!(decode(&encoded), ("Widget issue".to_string(), state));
        }
    }

    #[test]
    fn reencoding_never_stacks_tags() {
        for state in TopicState::ALL {
            let once = encode("Widget issue", state);
            let (base, decoded) = decode(&once);
            let twice = encode(&base, decoded);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn transition_open_to_closed() {
        assert_eq!(
            resolve_transition("Refund request", TopicState::Closed),
            Ok("[CLOSED] Refund request".to_string())
        );
    }

    #[test]
    fn transition_to_same_state_is_a_noop() {
        assert_eq!(
            resolve_transition("[CLOSED] Refund request", TopicState::Closed),
            Err(Rejection::AlreadyInState(TopicState::Closed))
        );
        assert_eq!(
            resolve_transition("Refund request", TopicState::Open),
            Err(Rejection::AlreadyInState(TopicState::Open))
        );
    }

    #[test]
    fn transition_pending_fix_back_to_open() {
        assert_eq!(
            resolve_transition("[PENDING FIX] Broken widget", TopicState::Open),
            Ok("Broken widget".to_string())
        );
    }

    #[test]
    fn closed_is_not_terminal() {
        assert_eq!(
            resolve_transition("[CLOSED] Refund request", TopicState::PendingRefund),
            Ok("[PENDING REFUND] Refund request".to_string())
        );
    }

    #[test]
    fn label_parse_accepts_any_case() {
        assert_eq!(TopicState::parse("closed"), Some(TopicState::Closed));
        assert_eq!(TopicState::parse(" pending refund "), Some(TopicState::PendingRefund));
        assert_eq!(TopicState::parse("OPEN"), Some(TopicState::Open));
        assert_eq!(TopicState::parse("ON HOLD"), None);
    }

    #[test]
    fn rejections_carry_their_classification() {
        let rejection = Rejection::UnrecognizedTarget("FROZEN".to_string());
        assert_eq!(rejection.to_string(), "unrecognized state label: FROZEN");
        let rejection = Rejection::AlreadyInState(TopicState::Closed);
        assert_eq!(rejection.to_string(), "topic already has that state: CLOSED");
    }

    #[test]
    fn resolver_is_total_over_odd_inputs() {
        for title in ["", "  ", "[", "[]", "[CLOSED]", "[CLOSED]x", "💡 idea"] {
            for state in TopicState::ALL {
                // Every input classifies as success or rejection, never a panic.
                let _ = resolve_transition(title, state);
            }
        }
    }

    #[test]
    fn bare_tag_decodes_to_empty_base() {
        assert_eq!(decode("[CLOSED]"), (String::new(), TopicState::Closed));
    }
}
