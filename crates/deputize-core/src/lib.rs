//! # deputize core
//!
//! Reconciles group membership in downstream systems against the current
//! on-call roster.
//!
//! ## Architecture
//!
//! Each downstream system is a sink implementing three capabilities:
//!
//! - [`IdentityResolver`] - Map a roster entry (email) to a sink identity
//! - [`SnapshotReader`] - Read the live membership of the target group
//! - [`SinkMutator`] - Apply a [`MutationPlan`]
//!
//! The [`Reconciler`] pulls them together per sink:
//!
//! ```ignore
//! use deputize_core::prelude::*;
//!
//! let roster = source.fetch_roster(&schedules, &TimeWindow::starting_now(window)).await?;
//! let reconciler = Reconciler::new(ReconcilerConfig::default());
//! let report = reconciler
//!     .reconcile(&roster, &[ReconcileTarget::new(ldap_sink)])
//!     .await;
//! assert!(report.is_success());
//! ```
//!
//! ## Crate Organization
//!
//! - [`identity`] - Normalized roster entries and sink identities
//! - [`types`] - Sink kinds, phases, handles and policies
//! - [`error`] - Error types with transient/permanent classification
//! - [`traits`] - Sink capability traits
//! - [`resolver`] - Roster to sink identity resolution
//! - [`diff`] - Mutation plan computation
//! - [`mutation`] - Mutation results and the per-member apply loop
//! - [`reconciler`] - Per-sink state machine and pass orchestration

pub mod diff;
pub mod error;
pub mod identity;
pub mod mutation;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod snapshot;
pub mod traits;
pub mod types;

pub use diff::{diff, MutationPlan, PlanSummary};
pub use error::{with_timeout, ReconcileError, SinkError, SinkResult};
pub use identity::{IdentitySet, ResolvedIdentity, Roster, RosterEntry};
pub use mutation::{apply_member_plan, ChangeAction, MutationResult};
pub use reconciler::{ReconcileTarget, Reconciler, ReconcilerConfig, TargetRoster};
pub use report::{MembershipChange, ReconciliationReport, SinkOutcome, SinkReport};
pub use snapshot::MembershipSnapshot;
pub use traits::{
    ChangeNotifier, IdentityResolver, MemberOp, ReconcilableSink, RosterSource, Sink,
    SinkMutator, SnapshotReader,
};
pub use types::{SinkHandle, SinkKind, SinkPhase, SinkPolicy, TimeWindow};

/// Re-export `async_trait` so sink crates share the same version.
pub use async_trait::async_trait;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::diff::{diff, MutationPlan};
    pub use crate::error::{with_timeout, ReconcileError, SinkError, SinkResult};
    pub use crate::identity::{
        identity_set, roster_from, IdentitySet, ResolvedIdentity, Roster, RosterEntry,
    };
    pub use crate::mutation::{apply_member_plan, MutationResult};
    pub use crate::reconciler::{ReconcileTarget, Reconciler, ReconcilerConfig, TargetRoster};
    pub use crate::report::{
        MembershipChange, ReconciliationReport, SinkOutcome, SinkReport,
    };
    pub use crate::snapshot::MembershipSnapshot;
    pub use crate::traits::{
        ChangeNotifier, IdentityResolver, MemberOp, ReconcilableSink, RosterSource, Sink,
        SinkMutator, SnapshotReader,
    };
    pub use crate::types::{SinkHandle, SinkKind, SinkPhase, SinkPolicy, TimeWindow};
}
