//! Per-sink and combined reconciliation reports.

use serde::Serialize;

use crate::diff::{MutationPlan, PlanSummary};
use crate::error::ReconcileError;
use crate::identity::{describe_all, IdentitySet, Roster};
use crate::mutation::MutationResult;
use crate::resolver::ResolutionFailure;
use crate::types::{SinkKind, SinkPhase};

/// How a sink's pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SinkOutcome {
    /// Membership already matched.
    Unchanged,
    /// The plan was applied in full.
    Changed,
    /// A plan was computed but not applied.
    DryRun,
    /// The sink policy chose not to act.
    Skipped { reason: String },
    /// The sink ended in the failed state.
    Failed,
}

/// Everything that happened to one sink during a pass.
#[derive(Debug)]
pub struct SinkReport {
    pub sink: String,
    pub kind: SinkKind,
    /// Terminal phase, `Done` or `Failed`.
    pub phase: SinkPhase,
    /// Phase the sink was in when it failed.
    pub failed_in: Option<SinkPhase>,
    pub resolution_failures: Vec<ResolutionFailure>,
    pub plan: Option<MutationPlan>,
    pub mutation: Option<MutationResult>,
    pub outcome: SinkOutcome,
    pub error: Option<ReconcileError>,
}

impl SinkReport {
    /// Whether the sink finished without error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.phase == SinkPhase::Done
    }

    /// Identities added during this pass.
    #[must_use]
    pub fn added(&self) -> IdentitySet {
        self.mutation
            .as_ref()
            .map(MutationResult::added)
            .unwrap_or_default()
    }

    /// Identities removed during this pass.
    #[must_use]
    pub fn removed(&self) -> IdentitySet {
        self.mutation
            .as_ref()
            .map(MutationResult::removed)
            .unwrap_or_default()
    }

    /// Errors for every roster entry that was excluded.
    pub fn resolution_errors(&self) -> Vec<ReconcileError> {
        self.resolution_failures
            .iter()
            .map(|f| f.to_error(&self.sink))
            .collect()
    }

    /// Planned changes in display form.
    #[must_use]
    pub fn plan_summary(&self) -> PlanSummary {
        self.plan
            .as_ref()
            .map(MutationPlan::summary)
            .unwrap_or_default()
    }

    /// Changes in display form: what was applied once the plan ran,
    /// otherwise what was planned.
    #[must_use]
    pub fn change_summary(&self) -> PlanSummary {
        match &self.mutation {
            Some(_) => PlanSummary {
                remove: describe_all(&self.removed()),
                add: describe_all(&self.added()),
            },
            None => self.plan_summary(),
        }
    }
}

/// Aggregated result of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconciliationReport {
    /// Desired roster the pass reconciled against.
    pub roster: Roster,
    /// One report per sink, in configuration order.
    pub sinks: Vec<SinkReport>,
}

impl ReconciliationReport {
    /// Whether every sink finished without error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.sinks.iter().all(SinkReport::is_success)
    }

    /// Reports of sinks that failed.
    pub fn failed_sinks(&self) -> impl Iterator<Item = &SinkReport> {
        self.sinks.iter().filter(|r| !r.is_success())
    }

    /// Look up a sink's report by name.
    #[must_use]
    pub fn sink(&self, name: &str) -> Option<&SinkReport> {
        self.sinks.iter().find(|r| r.sink == name)
    }
}

/// A membership change applied to one sink, as announced to notifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    pub sink: String,
    pub kind: SinkKind,
    /// Group DN, group path or channel.
    pub target: String,
    pub before: IdentitySet,
    pub after: IdentitySet,
}

impl MembershipChange {
    /// One-line human description.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "Updated `{}` on {}: from {{{}}} to {{{}}}",
            self.target,
            self.sink,
            describe_all(&self.before).join(", "),
            describe_all(&self.after).join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::identity::{identity_set, ResolvedIdentity};
    use crate::mutation::{AppliedChange, ChangeAction, FailedChange};

    #[test]
    fn test_change_summary_lists_only_applied_changes() {
        let plan = diff(
            &identity_set(["alice", "bob"]),
            &identity_set(["carol"]),
            &IdentitySet::new(),
        );
        let mut report = SinkReport {
            sink: "ldap".to_string(),
            kind: SinkKind::Ldap,
            phase: SinkPhase::Failed,
            failed_in: Some(SinkPhase::Mutating),
            resolution_failures: Vec::new(),
            plan: Some(plan),
            mutation: None,
            outcome: SinkOutcome::Failed,
            error: None,
        };
        assert_eq!(report.change_summary().add, vec!["alice", "bob"]);

        report.mutation = Some(MutationResult {
            applied: vec![
                AppliedChange {
                    action: ChangeAction::Remove,
                    identity: ResolvedIdentity::new("carol"),
                },
                AppliedChange {
                    action: ChangeAction::Add,
                    identity: ResolvedIdentity::new("alice"),
                },
            ],
            failed: vec![FailedChange {
                action: ChangeAction::Add,
                identity: ResolvedIdentity::new("bob"),
                error: "insufficient access".to_string(),
            }],
        });

        let summary = report.change_summary();
        assert_eq!(summary.add, vec!["alice"]);
        assert_eq!(summary.remove, vec!["carol"]);
        assert_eq!(report.plan_summary().add, vec!["alice", "bob"]);
    }

    #[test]
    fn test_change_description() {
        let change = MembershipChange {
            sink: "ldap".to_string(),
            kind: SinkKind::Ldap,
            target: "cn=oncall,ou=groups,dc=example,dc=com".to_string(),
            before: identity_set(["alice", "bob"]),
            after: identity_set(["bob", "carol"]),
        };
        assert_eq!(
            change.describe(),
            "Updated `cn=oncall,ou=groups,dc=example,dc=com` on ldap: from {alice, bob} to {bob, carol}"
        );
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(SinkOutcome::Skipped {
            reason: "empty".to_string(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "empty");
    }
}
