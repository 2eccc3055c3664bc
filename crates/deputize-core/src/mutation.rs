//! Mutation results and the per-member apply loop.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::diff::MutationPlan;
use crate::error::{with_timeout, ReconcileError, SinkError};
use crate::identity::{IdentitySet, ResolvedIdentity};
use crate::traits::MemberOp;
use crate::types::SinkHandle;

/// Kind of single-member change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Add,
    Remove,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::Add => write!(f, "add"),
            ChangeAction::Remove => write!(f, "remove"),
        }
    }
}

/// A change the sink accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub action: ChangeAction,
    pub identity: ResolvedIdentity,
}

/// A change the sink rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedChange {
    pub action: ChangeAction,
    pub identity: ResolvedIdentity,
    pub error: String,
}

impl fmt::Display for FailedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.action, self.identity.describe(), self.error)
    }
}

/// Outcome of applying a plan. Applied changes are never rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationResult {
    pub applied: Vec<AppliedChange>,
    pub failed: Vec<FailedChange>,
}

impl MutationResult {
    /// Result of an empty plan.
    #[must_use]
    pub fn noop() -> Self {
        Self::default()
    }

    /// Result for sinks that write the whole plan in one call.
    ///
    /// Every change shares the fate of that call.
    pub fn from_bulk(plan: &MutationPlan, outcome: Result<(), SinkError>) -> Self {
        let changes = plan
            .to_remove
            .iter()
            .map(|id| (ChangeAction::Remove, id))
            .chain(plan.to_add.iter().map(|id| (ChangeAction::Add, id)));

        match outcome {
            Ok(()) => Self {
                applied: changes
                    .map(|(action, identity)| AppliedChange {
                        action,
                        identity: identity.clone(),
                    })
                    .collect(),
                failed: Vec::new(),
            },
            Err(e) => {
                let error = e.to_string();
                Self {
                    applied: Vec::new(),
                    failed: changes
                        .map(|(action, identity)| FailedChange {
                            action,
                            identity: identity.clone(),
                            error: error.clone(),
                        })
                        .collect(),
                }
            }
        }
    }

    /// Whether every change was applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Identities added.
    #[must_use]
    pub fn added(&self) -> IdentitySet {
        self.applied_with(ChangeAction::Add)
    }

    /// Identities removed.
    #[must_use]
    pub fn removed(&self) -> IdentitySet {
        self.applied_with(ChangeAction::Remove)
    }

    fn applied_with(&self, action: ChangeAction) -> IdentitySet {
        self.applied
            .iter()
            .filter(|c| c.action == action)
            .map(|c| c.identity.clone())
            .collect()
    }

    /// Membership after the applied changes, starting from `current`.
    #[must_use]
    pub fn resulting_members(&self, current: &IdentitySet) -> IdentitySet {
        let removed = self.removed();
        current
            .difference(&removed)
            .cloned()
            .chain(self.added())
            .collect()
    }

    /// Partial-failure error naming only the failed changes.
    pub fn error(&self, sink: &str) -> Option<ReconcileError> {
        if self.failed.is_empty() {
            return None;
        }
        Some(ReconcileError::MutationPartialFailure {
            sink: sink.to_string(),
            failed: self.failed.clone(),
            applied: self.applied.len(),
        })
    }
}

/// Apply a plan one member at a time.
///
/// Every removal is issued before any addition and each change is attempted
/// regardless of earlier failures. A call still running after `call_timeout`
/// is recorded as a failed change.
#[instrument(skip(sink, handle, plan), fields(sink = %sink.name(), target = %handle.target, changes = plan.len()))]
pub async fn apply_member_plan<M>(
    sink: &M,
    handle: &SinkHandle,
    plan: &MutationPlan,
    call_timeout: Duration,
) -> MutationResult
where
    M: MemberOp + ?Sized,
{
    let mut result = MutationResult::noop();

    for member in &plan.to_remove {
        let outcome =
            with_timeout("remove member", call_timeout, sink.remove_member(handle, member)).await;
        record(&mut result, ChangeAction::Remove, member, outcome);
    }

    for member in &plan.to_add {
        let outcome = with_timeout("add member", call_timeout, sink.add_member(handle, member)).await;
        record(&mut result, ChangeAction::Add, member, outcome);
    }

    result
}

fn record(
    result: &mut MutationResult,
    action: ChangeAction,
    member: &ResolvedIdentity,
    outcome: Result<(), SinkError>,
) {
    match outcome {
        Ok(()) => {
            info!(%action, member = %member.describe(), "Membership change applied");
            result.applied.push(AppliedChange {
                action,
                identity: member.clone(),
            });
        }
        Err(e) => {
            warn!(%action, member = %member.describe(), error = %e, code = e.error_code(), "Membership change failed");
            result.failed.push(FailedChange {
                action,
                identity: member.clone(),
                error: e.to_string(),
            });
        }
    }
}
