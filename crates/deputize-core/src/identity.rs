//! Roster and sink identity types
//!
//! Every identity is normalized on construction so that set comparisons are
//! independent of input ordering, duplicates, and letter case.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A person currently on call, as reported by the roster source.
///
/// Usually an email address. The value is trimmed and case-folded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RosterEntry(String);

impl RosterEntry {
    /// Create a roster entry from a raw identity string.
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_lowercase())
    }

    /// Get the normalized value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RosterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RosterEntry {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The desired on-call set. Sorted and free of duplicates.
pub type Roster = BTreeSet<RosterEntry>;

/// Build a roster from raw identity strings, dropping blanks.
pub fn roster_from<I, S>(values: I) -> Roster
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(RosterEntry::new)
        .filter(|entry| !entry.as_str().is_empty())
        .collect()
}

/// A sink-specific identity (directory UID, Gitlab user ID, Slack user ID).
///
/// Equality, ordering and hashing use the case-folded key; the value is kept
/// exactly as the sink reported it so writes use the sink's own spelling.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    value: String,
    key: String,
    label: Option<String>,
}

impl ResolvedIdentity {
    /// Create a resolved identity.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into().trim().to_string();
        let key = value.to_lowercase();
        Self {
            value,
            key,
            label: None,
        }
    }

    /// Attach a human-readable label (e.g. a username for a numeric ID).
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The identity as the sink spells it.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The normalized comparison key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Optional human-readable label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Label when known, otherwise the value.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.label {
            Some(label) if label != &self.value => format!("{label} ({})", self.value),
            _ => self.value.clone(),
        }
    }
}

impl PartialEq for ResolvedIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ResolvedIdentity {}

impl PartialOrd for ResolvedIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResolvedIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Hash for ResolvedIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for ResolvedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&str> for ResolvedIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResolvedIdentity {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A normalized set of sink identities.
pub type IdentitySet = BTreeSet<ResolvedIdentity>;

/// Build an identity set from raw values, dropping blanks.
pub fn identity_set<I, S>(values: I) -> IdentitySet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values
        .into_iter()
        .map(ResolvedIdentity::new)
        .filter(|id| !id.value().is_empty())
        .collect()
}

/// Render an identity set as sorted display strings.
#[must_use]
pub fn describe_all(set: &IdentitySet) -> Vec<String> {
    set.iter().map(ResolvedIdentity::describe).collect()
}
