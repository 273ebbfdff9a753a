use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Why a single host's command did not succeed.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("exit status {0}")]
    ExitStatus(i32),
    #[error("terminated by signal")]
    Signaled,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("skipped due to fail-fast")]
    SkippedFailFast,
    #[error("task aborted: {0}")]
    TaskAborted(String),
}

impl ExecError {
    /// True when the host was never attempted because of fail-fast.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::SkippedFailFast)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Every problem found while validating a registry, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_lines(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

fn join_lines(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
