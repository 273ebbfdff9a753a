//! Options and per-host results of a dispatch.

use std::time::Duration;

use crate::error::ExecError;
use crate::models::Connection;

/// Concurrency cap used when none (or zero) is given.
pub const DEFAULT_PARALLEL: usize = 10;

/// Exit code recorded for hosts whose command never produced a status.
pub const NOT_RUN_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Remote command handed to ssh verbatim.
    pub command: String,
    /// Maximum number of hosts running at once. Zero means [`DEFAULT_PARALLEL`].
    pub parallel: usize,
    /// Per-host deadline. `None` or zero means unbounded.
    pub timeout: Option<Duration>,
    /// Stop dispatching, and cancel in-flight hosts, after the first failure.
    pub fail_fast: bool,
    /// Write output live with `[id] ` prefixes instead of capturing it.
    pub stream: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            command: String::new(),
            parallel: DEFAULT_PARALLEL,
            timeout: None,
            fail_fast: false,
            stream: false,
        }
    }
}

impl ExecOptions {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn effective_parallel(&self) -> usize {
        if self.parallel == 0 {
            DEFAULT_PARALLEL
        } else {
            self.parallel
        }
    }

    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
}

/// Outcome of running the command on one host.
#[derive(Debug)]
pub struct ExecResult {
    pub connection: Connection,
    /// Captured output; always empty in stream mode.
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub error: Option<ExecError>,
    pub duration: Duration,
}

impl ExecResult {
    /// A result for a host whose command was never started.
    pub fn not_run(connection: Connection, error: ExecError) -> Self {
        Self {
            connection,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: NOT_RUN_EXIT_CODE,
            error: Some(error),
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn was_skipped(&self) -> bool {
        self.error.as_ref().is_some_and(ExecError::is_skipped)
    }
}
