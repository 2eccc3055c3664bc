//! Error types
//!
//! [`SinkError`] describes a failed call against one external system and is
//! classified transient/permanent. [`ReconcileError`] is the domain-level
//! outcome the reconciler reports per sink.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::mutation::FailedChange;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Error that can occur during a single call to a sink or roster API.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Failed to establish a connection.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The call did not complete in time.
    #[error("{operation} timed out after {timeout_secs} seconds")]
    Timeout { operation: String, timeout_secs: u64 },

    /// Target is temporarily unavailable (5xx, rate limited).
    #[error("target unavailable: {message}")]
    Unavailable { message: String },

    /// Credentials were rejected.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Credentials lack permission for the operation.
    #[error("authorization failed: insufficient permissions for {operation}")]
    AuthorizationFailed { operation: String },

    /// Target object (group, channel, user) does not exist.
    #[error("not found: {identifier}")]
    NotFound { identifier: String },

    /// The API answered with an error status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Sink configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Response could not be interpreted.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Any other failed operation.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl SinkError {
    /// Whether the condition may clear up on the next scheduled run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SinkError::ConnectionFailed { .. }
                | SinkError::Timeout { .. }
                | SinkError::Unavailable { .. }
        )
    }

    /// Stable code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            SinkError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            SinkError::Timeout { .. } => "TIMEOUT",
            SinkError::Unavailable { .. } => "TARGET_UNAVAILABLE",
            SinkError::AuthenticationFailed { .. } => "AUTH_FAILED",
            SinkError::AuthorizationFailed { .. } => "AUTHORIZATION_FAILED",
            SinkError::NotFound { .. } => "NOT_FOUND",
            SinkError::Api { .. } => "API_ERROR",
            SinkError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            SinkError::InvalidData { .. } => "INVALID_DATA",
            SinkError::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        SinkError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SinkError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        SinkError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SinkError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        SinkError::Timeout {
            operation: operation.into(),
            timeout_secs: timeout.as_secs(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        SinkError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        SinkError::InvalidData {
            message: message.into(),
        }
    }
}

/// Result type for sink calls.
pub type SinkResult<T> = Result<T, SinkError>;

/// Run one external call, failing with [`SinkError::Timeout`] once `limit` passes.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, call: F) -> SinkResult<T>
where
    F: Future<Output = SinkResult<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(SinkError::timeout(operation, limit)))
}

/// Reconciliation outcome errors, each naming the sink it belongs to.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The desired roster could not be fetched; nothing can be reconciled.
    #[error("roster unavailable: {message}")]
    RosterUnavailable {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// A roster entry matched more than one sink user.
    #[error("[{sink}] found more than one user for {identity}: {candidates} users found")]
    ResolutionAmbiguous {
        sink: String,
        identity: String,
        candidates: usize,
    },

    /// A roster entry matched no sink user.
    #[error("[{sink}] no user found for {identity}")]
    ResolutionNotFound { sink: String, identity: String },

    /// Roster entries had no sink user and the sink does not allow skipping them.
    #[error("[{sink}] unresolved identities: {}", .identities.join(", "))]
    UnresolvedIdentities {
        sink: String,
        identities: Vec<String>,
    },

    /// The lookup call for a roster entry failed.
    #[error("[{sink}] lookup of {identity} failed: {source}")]
    ResolutionFailed {
        sink: String,
        identity: String,
        #[source]
        source: SinkError,
    },

    /// The group or channel could not be read.
    #[error("[{sink}] snapshot unavailable: {source}")]
    SnapshotUnavailable {
        sink: String,
        #[source]
        source: SinkError,
    },

    /// Some membership changes failed; the applied ones are kept.
    #[error("[{sink}] {} of {} membership changes failed: {}", .failed.len(), .failed.len() + .applied, describe_failed(.failed))]
    MutationPartialFailure {
        sink: String,
        failed: Vec<FailedChange>,
        applied: usize,
    },
}

fn describe_failed(failed: &[FailedChange]) -> String {
    failed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReconcileError {
    /// Create a roster unavailable error.
    pub fn roster_unavailable(message: impl Into<String>) -> Self {
        ReconcileError::RosterUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create a roster unavailable error with source.
    pub fn roster_unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ReconcileError::RosterUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Sink the error belongs to, if any.
    pub fn sink(&self) -> Option<&str> {
        match self {
            ReconcileError::RosterUnavailable { .. } => None,
            ReconcileError::ResolutionAmbiguous { sink, .. }
            | ReconcileError::ResolutionNotFound { sink, .. }
            | ReconcileError::UnresolvedIdentities { sink, .. }
            | ReconcileError::ResolutionFailed { sink, .. }
            | ReconcileError::SnapshotUnavailable { sink, .. }
            | ReconcileError::MutationPartialFailure { sink, .. } => Some(sink),
        }
    }

    /// Stable code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::RosterUnavailable { .. } => "ROSTER_UNAVAILABLE",
            ReconcileError::ResolutionAmbiguous { .. } => "RESOLUTION_AMBIGUOUS",
            ReconcileError::ResolutionNotFound { .. } => "RESOLUTION_NOT_FOUND",
            ReconcileError::UnresolvedIdentities { .. } => "UNRESOLVED_IDENTITIES",
            ReconcileError::ResolutionFailed { .. } => "RESOLUTION_FAILED",
            ReconcileError::SnapshotUnavailable { .. } => "SNAPSHOT_UNAVAILABLE",
            ReconcileError::MutationPartialFailure { .. } => "MUTATION_PARTIAL_FAILURE",
        }
    }
}
