//! Quelta Access Policy
//!
//! Static allow-lists for the two privileged surfaces: direct messages to
//! the bot and the /archive command. Read-only after process start.

use std::collections::HashSet;

/// Stand-in id for an update that carries no sender. Never a member of
/// either set, so an unauthenticated actor always fails the gate.
pub const ANONYMOUS_USER_ID: i64 = 0;

#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    dm_users: HashSet<i64>,
    archive_users: HashSet<i64>,
}

impl AccessPolicy {
    pub fn new(
        dm_users: impl IntoIterator<Item = i64>,
        archive_users: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            dm_users: dm_users
                .into_iter()
                .filter(|id| *id != ANONYMOUS_USER_ID)
                .collect(),
            archive_users: archive_users
                .into_iter()
                .filter(|id| *id != ANONYMOUS_USER_ID)
                .collect(),
        }
    }

    pub fn allows_dm(&self, user_id: i64) -> bool {
        self.dm_users.contains(&user_id)
    }

    pub fn allows_archive(&self, user_id: i64) -> bool {
        self.archive_users.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_ids_are_allowed() {
        let policy = AccessPolicy::new([111, 222], [333]);
        assert!(policy.allows_dm(111));
        assert!(policy.allows_dm(222));
        assert!(policy.allows_archive(333));
    }

    #[test]
    fn unknown_ids_are_denied() {
        let policy = AccessPolicy::new([111], [333]);
        assert!(!policy.allows_dm(999));
        assert!(!policy.allows_archive(111));
        assert!(!policy.allows_dm(333));
    }

    #[test]
    fn anonymous_actor_is_always_denied() {
        let policy = AccessPolicy::new([ANONYMOUS_USER_ID, 111], [ANONYMOUS_USER_ID]);
        assert!(!policy.allows_dm(ANONYMOUS_USER_ID));
        assert!(!policy.allows_archive(ANONYMOUS_USER_ID));
        assert!(policy.allows_dm(111));
    }

    #[test]
    fn empty_lists_deny_everyone() {
        let policy = AccessPolicy::default();
        assert!(!policy.allows_dm(1));
        assert!(!policy.allows_archive(1));
    }
}
