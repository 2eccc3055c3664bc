//! Membership snapshot read from a sink at the start of a pass.

use crate::identity::IdentitySet;
use crate::types::SinkHandle;

/// Current members of a sink's group or channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSnapshot {
    /// Members the sink reports today.
    pub members: IdentitySet,
    /// Members that must never be removed (e.g. Gitlab maintainers).
    pub protected: IdentitySet,
    /// Locator for applying changes to the same group.
    pub handle: SinkHandle,
}

impl MembershipSnapshot {
    /// Create a snapshot with no protected members.
    pub fn new(handle: SinkHandle, members: IdentitySet) -> Self {
        Self {
            members,
            protected: IdentitySet::new(),
            handle,
        }
    }

    /// Mark members as protected.
    #[must_use]
    pub fn with_protected(mut self, protected: IdentitySet) -> Self {
        self.protected = protected;
        self
    }

    /// Number of current members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{identity_set, ResolvedIdentity};

    #[test]
    fn test_snapshot_members_are_case_insensitive() {
        let snapshot = MembershipSnapshot::new(
            SinkHandle::new("cn=oncall,ou=groups,dc=example,dc=com"),
            identity_set(["Alice", "bob"]),
        );
        assert!(snapshot.members.contains(&ResolvedIdentity::new("alice")));
        assert!(!snapshot.members.contains(&ResolvedIdentity::new("carol")));
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.protected.is_empty());
    }
}
