//! Reconciler
//!
//! Drives every sink through
//! `Idle → Resolving → Snapshotting → Diffing → Mutating → Done | Failed`
//! against one desired roster. Sinks are independent: a failure in one never
//! stops the others, and all outcomes land in a [`ReconciliationReport`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::diff::diff;
use crate::error::{with_timeout, ReconcileError};
use crate::identity::Roster;
use crate::mutation::MutationResult;
use crate::report::{MembershipChange, ReconciliationReport, SinkOutcome, SinkReport};
use crate::resolver::resolve_roster;
use crate::snapshot::MembershipSnapshot;
use crate::traits::{ChangeNotifier, ReconcilableSink};
use crate::types::SinkPhase;

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Reconcile sinks concurrently.
    #[serde(default = "default_concurrent")]
    pub concurrent: bool,
    /// Upper bound for each external call a sink makes, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Compute plans without applying them.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_concurrent() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            concurrent: default_concurrent(),
            timeout_secs: default_timeout_secs(),
            dry_run: false,
        }
    }
}

impl ReconcilerConfig {
    /// Per-call timeout.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Desired membership for one target.
#[derive(Debug, Clone)]
pub enum TargetRoster {
    /// Follow the pass-wide roster.
    Shared,
    /// Follow a roster of its own (e.g. Gitlab approvers).
    Own(Roster),
    /// The target's own roster could not be fetched; the message says why.
    Unavailable(String),
}

/// A sink together with the roster it should mirror.
#[derive(Clone)]
pub struct ReconcileTarget {
    pub sink: Arc<dyn ReconcilableSink>,
    pub roster: TargetRoster,
}

impl ReconcileTarget {
    /// Target that follows the pass-wide roster.
    pub fn new(sink: Arc<dyn ReconcilableSink>) -> Self {
        Self {
            sink,
            roster: TargetRoster::Shared,
        }
    }

    /// Target that follows its own roster.
    #[must_use]
    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = TargetRoster::Own(roster);
        self
    }

    /// Target whose own roster failed to load. It fails alone during the pass.
    #[must_use]
    pub fn with_roster_error(mut self, error: &ReconcileError) -> Self {
        let mut message = match error {
            ReconcileError::RosterUnavailable { message, .. } => message.clone(),
            other => other.to_string(),
        };
        let mut source = std::error::Error::source(error);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        self.roster = TargetRoster::Unavailable(message);
        self
    }

    /// Own roster, the roster error, or `shared`.
    pub fn roster_or<'a>(&'a self, shared: &'a Roster) -> Result<&'a Roster, &'a str> {
        match &self.roster {
            TargetRoster::Shared => Ok(shared),
            TargetRoster::Own(roster) => Ok(roster),
            TargetRoster::Unavailable(message) => Err(message),
        }
    }
}

impl std::fmt::Debug for ReconcileTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileTarget")
            .field("sink", &self.sink.name())
            .field("roster", &self.roster)
            .finish()
    }
}

/// Reconciles sinks against a desired roster.
pub struct Reconciler {
    config: ReconcilerConfig,
    notifiers: Vec<Arc<dyn ChangeNotifier>>,
}

impl Reconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            notifiers: Vec::new(),
        }
    }

    /// Announce applied changes through `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run one pass over every target.
    ///
    /// Reports are returned in target order whether or not sinks ran
    /// concurrently.
    pub async fn reconcile(
        &self,
        roster: &Roster,
        targets: &[ReconcileTarget],
    ) -> ReconciliationReport {
        info!(
            roster = ?roster.iter().map(ToString::to_string).collect::<Vec<_>>(),
            sinks = targets.len(),
            concurrent = self.config.concurrent,
            dry_run = self.config.dry_run,
            "Starting reconciliation pass"
        );

        let sinks = if self.config.concurrent {
            join_all(targets.iter().map(|target| self.reconcile_target(target, roster))).await
        } else {
            let mut reports = Vec::with_capacity(targets.len());
            for target in targets {
                reports.push(self.reconcile_target(target, roster).await);
            }
            reports
        };

        let report = ReconciliationReport {
            roster: roster.clone(),
            sinks,
        };

        let failed = report.failed_sinks().count();
        if failed == 0 {
            info!(sinks = report.sinks.len(), "Reconciliation pass complete");
        } else {
            warn!(
                sinks = report.sinks.len(),
                failed, "Reconciliation pass complete with failures"
            );
        }

        report
    }

    async fn reconcile_target(&self, target: &ReconcileTarget, shared: &Roster) -> SinkReport {
        let sink = target.sink.as_ref();
        match target.roster_or(shared) {
            Ok(desired) => self.reconcile_sink(sink, desired).await,
            Err(message) => {
                let span = info_span!("reconcile_sink", sink = %sink.name(), kind = %sink.kind());
                let _guard = span.enter();
                let mut run = SinkRun::new(sink);
                run.enter(SinkPhase::Resolving);
                run.fail(ReconcileError::roster_unavailable(format!(
                    "[{}] {message}",
                    sink.name()
                )))
            }
        }
    }

    /// Run one sink through the whole state machine.
    pub async fn reconcile_sink(&self, sink: &dyn ReconcilableSink, roster: &Roster) -> SinkReport {
        let span = info_span!("reconcile_sink", sink = %sink.name(), kind = %sink.kind());
        self.run_sink(sink, roster).instrument(span).await
    }

    async fn run_sink(&self, sink: &dyn ReconcilableSink, roster: &Roster) -> SinkReport {
        let mut run = SinkRun::new(sink);
        let policy = sink.policy();

        run.enter(SinkPhase::Resolving);
        let resolution = match resolve_roster(sink, roster, self.config.call_timeout()).await {
            Ok(resolution) => resolution,
            Err(e) => return run.fail(e),
        };
        run.report.resolution_failures = resolution.failures.clone();

        if !policy.skip_unresolved {
            let missing: Vec<String> = resolution.not_found().map(ToString::to_string).collect();
            if !missing.is_empty() {
                return run.fail(ReconcileError::UnresolvedIdentities {
                    sink: sink.name().to_string(),
                    identities: missing,
                });
            }
        }

        run.enter(SinkPhase::Snapshotting);
        let read = sink.read_snapshot();
        let snapshot = match with_timeout("read snapshot", self.config.call_timeout(), read).await {
            Ok(snapshot) => snapshot,
            Err(source) => {
                return run.fail(ReconcileError::SnapshotUnavailable {
                    sink: sink.name().to_string(),
                    source,
                })
            }
        };
        debug!(
            members = snapshot.len(),
            protected = snapshot.protected.len(),
            target = %snapshot.handle.target,
            "Read membership snapshot"
        );

        run.enter(SinkPhase::Diffing);
        if resolution.resolved.is_empty() && policy.skip_when_empty {
            warn!("No resolved on-call users, leaving membership untouched");
            return run.finish(SinkOutcome::Skipped {
                reason: "no resolved on-call users".to_string(),
            });
        }

        let plan = diff(&resolution.resolved, &snapshot.members, &snapshot.protected);
        run.report.plan = Some(plan.clone());

        if plan.is_empty() {
            info!("Membership already up to date");
            return run.finish(SinkOutcome::Unchanged);
        }

        let summary = plan.summary();
        if self.config.dry_run {
            info!(remove = ?summary.remove, add = ?summary.add, "Dry run, not applying plan");
            return run.finish(SinkOutcome::DryRun);
        }

        run.enter(SinkPhase::Mutating);
        info!(remove = ?summary.remove, add = ?summary.add, "Applying membership plan");
        let result = sink.apply(&snapshot, &plan, self.config.call_timeout()).await;

        if !result.applied.is_empty() {
            self.announce(sink, &snapshot, &result).await;
        }

        let partial = result.error(sink.name());
        run.report.mutation = Some(result);
        match partial {
            Some(e) => run.fail(e),
            None => run.finish(SinkOutcome::Changed),
        }
    }

    async fn announce(
        &self,
        sink: &dyn ReconcilableSink,
        snapshot: &MembershipSnapshot,
        result: &MutationResult,
    ) {
        if self.notifiers.is_empty() {
            return;
        }

        let change = MembershipChange {
            sink: sink.name().to_string(),
            kind: sink.kind(),
            target: snapshot.handle.target.clone(),
            before: snapshot.members.clone(),
            after: result.resulting_members(&snapshot.members),
        };

        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(&change).await {
                warn!(error = %e, code = e.error_code(), "Failed to send change notification");
            }
        }
    }
}

/// Tracks one sink's state transitions while it runs.
struct SinkRun {
    report: SinkReport,
}

impl SinkRun {
    fn new(sink: &dyn ReconcilableSink) -> Self {
        Self {
            report: SinkReport {
                sink: sink.name().to_string(),
                kind: sink.kind(),
                phase: SinkPhase::Idle,
                failed_in: None,
                resolution_failures: Vec::new(),
                plan: None,
                mutation: None,
                outcome: SinkOutcome::Unchanged,
                error: None,
            },
        }
    }

    fn enter(&mut self, phase: SinkPhase) {
        debug!(from = %self.report.phase, to = %phase, "Sink phase transition");
        self.report.phase = phase;
    }

    fn fail(mut self, error: ReconcileError) -> SinkReport {
        error!(phase = %self.report.phase, code = error.error_code(), error = %error, "Sink reconciliation failed");
        self.report.failed_in = Some(self.report.phase);
        self.report.phase = SinkPhase::Failed;
        self.report.outcome = SinkOutcome::Failed;
        self.report.error = Some(error);
        self.report
    }

    fn finish(mut self, outcome: SinkOutcome) -> SinkReport {
        debug!(from = %self.report.phase, to = %SinkPhase::Done, "Sink phase transition");
        self.report.phase = SinkPhase::Done;
        self.report.outcome = outcome;
        self.report
    }
}
