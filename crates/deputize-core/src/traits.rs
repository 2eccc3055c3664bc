//! Sink capability traits
//!
//! A sink implements [`Sink`] plus the three capabilities the reconciler
//! drives: [`IdentityResolver`], [`SnapshotReader`] and [`SinkMutator`].
//! Sinks that change membership one member at a time implement
//! [`MemberOp`] and delegate [`SinkMutator::apply`] to
//! [`apply_member_plan`](crate::mutation::apply_member_plan), which owns the
//! ordering and partial-failure rules.

use std::time::Duration;

use async_trait::async_trait;

use crate::diff::MutationPlan;
use crate::error::{ReconcileError, SinkResult};
use crate::identity::{ResolvedIdentity, Roster, RosterEntry};
use crate::mutation::MutationResult;
use crate::report::MembershipChange;
use crate::snapshot::MembershipSnapshot;
use crate::types::{SinkHandle, SinkKind, SinkPolicy, TimeWindow};

/// Base trait for all sinks.
pub trait Sink: Send + Sync {
    /// Name used in logs, errors and the report (e.g. `ldap`, `slack:#ops`).
    fn name(&self) -> &str;

    /// Type of downstream system.
    fn kind(&self) -> SinkKind;

    /// Behavioural switches for this sink.
    fn policy(&self) -> SinkPolicy {
        SinkPolicy::default()
    }
}

/// Capability for mapping roster entries to sink identities.
#[async_trait]
pub trait IdentityResolver: Sink {
    /// Look up every sink user matching a roster entry.
    ///
    /// Issues exactly one external query and returns all candidates. An empty
    /// vector means the entry has no account in this sink; the caller decides
    /// what more than one candidate means.
    async fn lookup(&self, entry: &RosterEntry) -> SinkResult<Vec<ResolvedIdentity>>;
}

/// Capability for reading the live membership of the target group.
#[async_trait]
pub trait SnapshotReader: Sink {
    /// Read the current members, aggregated across all pages.
    async fn read_snapshot(&self) -> SinkResult<MembershipSnapshot>;
}

/// Capability for applying a mutation plan.
#[async_trait]
pub trait SinkMutator: Sink {
    /// Apply `plan` to the group described by `snapshot`.
    ///
    /// Never called with an empty plan. Each external call is bounded by
    /// `call_timeout`; a call that runs out of time is a failed change.
    async fn apply(
        &self,
        snapshot: &MembershipSnapshot,
        plan: &MutationPlan,
        call_timeout: Duration,
    ) -> MutationResult;
}

/// Capability for single-member changes.
#[async_trait]
pub trait MemberOp: Sink {
    /// Add one member to the group.
    async fn add_member(&self, handle: &SinkHandle, member: &ResolvedIdentity) -> SinkResult<()>;

    /// Remove one member from the group.
    async fn remove_member(&self, handle: &SinkHandle, member: &ResolvedIdentity)
        -> SinkResult<()>;
}

/// Marker trait for sinks the reconciler can drive end to end.
pub trait ReconcilableSink: IdentityResolver + SnapshotReader + SinkMutator {}

// Blanket implementation for any sink that implements all three capabilities
impl<T> ReconcilableSink for T where T: IdentityResolver + SnapshotReader + SinkMutator {}

/// Source of the desired on-call roster.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Union of the users on call for the named schedules during `window`.
    async fn fetch_roster(
        &self,
        schedules: &[String],
        window: &TimeWindow,
    ) -> Result<Roster, ReconcileError>;
}

/// Receiver of membership change announcements.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Announce a change that was applied to a sink.
    async fn notify(&self, change: &MembershipChange) -> SinkResult<()>;
}
