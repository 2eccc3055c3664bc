//! CLI error types and exit codes

use thiserror::Error;

use deputize_core::error::{ReconcileError, SinkError};
use deputize_secrets::SecretError;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: One or more sinks failed
/// - 2: Configuration or secret error
/// - 3: On-call roster unavailable
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Secrets error: {0}")]
    Secrets(#[from] SecretError),

    #[error("Roster unavailable: {0}")]
    Roster(String),

    #[error("Reconciliation failed for {count} sink(s): {sinks}")]
    SinksFailed { count: usize, sinks: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::SinksFailed { .. } => 1,
            CliError::Config(_) | CliError::Secrets(_) => 2,
            CliError::Roster(_) => 3,
        }
    }

    /// Print the error to stderr
    pub fn print(&self) {
        if std::env::var("NO_COLOR").is_err() {
            eprintln!("\x1b[31mError:\x1b[0m {self}");
        } else {
            eprintln!("Error: {self}");
        }

        if let Some(suggestion) = self.suggestion() {
            eprintln!("\nSuggestion: {suggestion}");
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => Some("Run 'deputize check-config' to list every problem."),
            CliError::Secrets(SecretError::ConfigError { .. }) => {
                Some("Check the secrets section of the config file.")
            }
            _ => None,
        }
    }
}

impl From<ReconcileError> for CliError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::RosterUnavailable { .. } => CliError::Roster(error_chain(&e)),
            other => CliError::SinksFailed {
                count: 1,
                sinks: error_chain(&other),
            },
        }
    }
}

impl From<SinkError> for CliError {
    fn from(e: SinkError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Config(format!("I/O error: {e}"))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Config(format!("JSON error: {e}"))
    }
}

/// An error followed by its sources, `: `-separated.
pub fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}
