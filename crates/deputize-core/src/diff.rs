//! Diff engine
//!
//! Pure set arithmetic over normalized identities. Input ordering and
//! duplicates never produce a change.

use serde::Serialize;

use crate::identity::{describe_all, IdentitySet};

/// Changes needed to turn the current membership into the desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationPlan {
    /// Members to remove. Applied first.
    pub to_remove: IdentitySet,
    /// Members to add. Applied after every removal.
    pub to_add: IdentitySet,
}

impl MutationPlan {
    /// Whether the plan changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }

    /// Number of single-member changes in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_remove.len() + self.to_add.len()
    }

    /// Membership after the whole plan has been applied to `current`.
    #[must_use]
    pub fn resulting_members(&self, current: &IdentitySet) -> IdentitySet {
        current
            .difference(&self.to_remove)
            .chain(self.to_add.iter())
            .cloned()
            .collect()
    }

    /// Printable form of the plan.
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            remove: describe_all(&self.to_remove),
            add: describe_all(&self.to_add),
        }
    }
}

/// Display strings of a plan, for logs and dry-run output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub remove: Vec<String>,
    pub add: Vec<String>,
}

/// Compute the mutation plan.
///
/// `to_remove = current − desired − protect` and `to_add = desired − current`.
#[must_use]
pub fn diff(desired: &IdentitySet, current: &IdentitySet, protect: &IdentitySet) -> MutationPlan {
    let to_remove = current
        .iter()
        .filter(|member| !desired.contains(*member) && !protect.contains(*member))
        .cloned()
        .collect();

    let to_add = desired.difference(current).cloned().collect();

    MutationPlan { to_remove, to_add }
}
