//! Enums and small value types shared by every sink.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Type of downstream system a sink writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// LDAP directory group.
    Ldap,
    /// Gitlab group membership.
    Gitlab,
    /// Slack channel topic.
    Slack,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Ldap => write!(f, "ldap"),
            SinkKind::Gitlab => write!(f, "gitlab"),
            SinkKind::Slack => write!(f, "slack"),
        }
    }
}

/// Per-sink reconciliation state.
///
/// `Idle → Resolving → Snapshotting → Diffing → Mutating → Done | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkPhase {
    /// Not started.
    Idle,
    /// Mapping roster entries to sink identities.
    Resolving,
    /// Reading the live membership.
    Snapshotting,
    /// Computing the mutation plan.
    Diffing,
    /// Applying the plan.
    Mutating,
    /// Finished without error.
    Done,
    /// Finished with an error.
    Failed,
}

impl std::fmt::Display for SinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkPhase::Idle => write!(f, "idle"),
            SinkPhase::Resolving => write!(f, "resolving"),
            SinkPhase::Snapshotting => write!(f, "snapshotting"),
            SinkPhase::Diffing => write!(f, "diffing"),
            SinkPhase::Mutating => write!(f, "mutating"),
            SinkPhase::Done => write!(f, "done"),
            SinkPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Locator a sink needs to apply changes to the group it snapshotted.
///
/// `target` is the group DN, group path or channel ID. `detail` carries any
/// sink-specific state read with the snapshot (e.g. the raw channel topic).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkHandle {
    /// Group DN, group path or channel ID.
    pub target: String,
    /// Extra state captured at snapshot time.
    pub detail: Option<String>,
}

impl SinkHandle {
    /// Create a handle for a target.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            detail: None,
        }
    }

    /// Attach snapshot-time detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Behavioural switches for one sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkPolicy {
    /// Continue when a roster entry has no matching sink user.
    #[serde(default = "default_skip_unresolved")]
    pub skip_unresolved: bool,

    /// Leave the group untouched when nobody resolved.
    #[serde(default)]
    pub skip_when_empty: bool,
}

fn default_skip_unresolved() -> bool {
    true
}

impl Default for SinkPolicy {
    fn default() -> Self {
        Self {
            skip_unresolved: default_skip_unresolved(),
            skip_when_empty: false,
        }
    }
}

impl SinkPolicy {
    /// Fail the sink on any unknown user.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.skip_unresolved = false;
        self
    }

    /// Skip mutation when the desired set is empty.
    #[must_use]
    pub fn with_skip_when_empty(mut self, skip: bool) -> Self {
        self.skip_when_empty = skip;
        self
    }
}

/// Time range an on-call lookup is evaluated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Start of the window.
    pub since: DateTime<Utc>,
    /// End of the window.
    pub until: DateTime<Utc>,
}

impl TimeWindow {
    /// Window starting now and lasting `duration`.
    #[must_use]
    pub fn starting_now(duration: Duration) -> Self {
        Self::starting_at(Utc::now(), duration)
    }

    /// Window starting at `since` and lasting `duration`.
    #[must_use]
    pub fn starting_at(since: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            since,
            until: since + duration,
        }
    }
}
