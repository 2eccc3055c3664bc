//! Identity resolution
//!
//! Maps every roster entry to exactly one sink identity. Zero candidates is a
//! soft failure, more than one is never guessed at, and a failed lookup call
//! aborts the sink.

use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use crate::error::{with_timeout, ReconcileError};
use crate::identity::{IdentitySet, ResolvedIdentity, Roster, RosterEntry};
use crate::traits::IdentityResolver;

/// A roster entry that did not map to a single sink identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionFailure {
    /// No sink user matched.
    NotFound { identity: RosterEntry },
    /// Several sink users matched.
    Ambiguous {
        identity: RosterEntry,
        candidates: Vec<ResolvedIdentity>,
    },
}

impl ResolutionFailure {
    /// The roster entry that failed.
    #[must_use]
    pub fn identity(&self) -> &RosterEntry {
        match self {
            ResolutionFailure::NotFound { identity }
            | ResolutionFailure::Ambiguous { identity, .. } => identity,
        }
    }

    /// Whether the entry matched several users.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, ResolutionFailure::Ambiguous { .. })
    }

    /// Convert into the reportable error for `sink`.
    pub fn to_error(&self, sink: &str) -> ReconcileError {
        match self {
            ResolutionFailure::NotFound { identity } => ReconcileError::ResolutionNotFound {
                sink: sink.to_string(),
                identity: identity.to_string(),
            },
            ResolutionFailure::Ambiguous {
                identity,
                candidates,
            } => ReconcileError::ResolutionAmbiguous {
                sink: sink.to_string(),
                identity: identity.to_string(),
                candidates: candidates.len(),
            },
        }
    }
}

/// Outcome of resolving a roster against one sink.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Identities that resolved to exactly one sink user.
    pub resolved: IdentitySet,
    /// Entries excluded from the desired set.
    pub failures: Vec<ResolutionFailure>,
}

impl Resolution {
    /// Entries with no sink user.
    pub fn not_found(&self) -> impl Iterator<Item = &RosterEntry> {
        self.failures
            .iter()
            .filter(|f| !f.is_ambiguous())
            .map(ResolutionFailure::identity)
    }
}

/// Resolve every roster entry through `resolver`.
///
/// Issues exactly one lookup per entry, each bounded by `call_timeout`.
/// Returns an error only when a lookup call itself fails.
#[instrument(skip(resolver, roster), fields(sink = %resolver.name(), entries = roster.len()))]
pub async fn resolve_roster<R>(
    resolver: &R,
    roster: &Roster,
    call_timeout: Duration,
) -> Result<Resolution, ReconcileError>
where
    R: IdentityResolver + ?Sized,
{
    let mut resolution = Resolution::default();

    for entry in roster {
        let candidates = with_timeout("lookup", call_timeout, resolver.lookup(entry))
            .await
            .map_err(|source| ReconcileError::ResolutionFailed {
                sink: resolver.name().to_string(),
                identity: entry.to_string(),
                source,
            })?;

        let mut candidates: Vec<ResolvedIdentity> = candidates
            .into_iter()
            .collect::<IdentitySet>()
            .into_iter()
            .collect();

        match candidates.len() {
            0 => {
                warn!(identity = %entry, "No user found in sink");
                resolution.failures.push(ResolutionFailure::NotFound {
                    identity: entry.clone(),
                });
            }
            1 => {
                if let Some(identity) = candidates.pop() {
                    debug!(identity = %entry, resolved = %identity, "Resolved identity");
                    resolution.resolved.insert(identity);
                }
            }
            n => {
                let names: Vec<String> = candidates.iter().map(ResolvedIdentity::describe).collect();
                error!(
                    identity = %entry,
                    candidates = n,
                    matches = ?names,
                    "More than one user found, excluding identity"
                );
                resolution.failures.push(ResolutionFailure::Ambiguous {
                    identity: entry.clone(),
                    candidates,
                });
            }
        }
    }

    Ok(resolution)
}
