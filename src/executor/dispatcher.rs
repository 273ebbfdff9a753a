//! Fan-out of one command over many hosts.
//!
//! Each host runs in its own tokio task. Tasks queue on a semaphore sized to
//! the concurrency cap and report back over a channel as `(index, result)`,
//! which is what keeps the returned vector in input order no matter which
//! host finishes first.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prefix_writer::{shared_sink, PrefixWriter, SharedSink};
use super::result_types::{ExecOptions, ExecResult, NOT_RUN_EXIT_CODE};
use super::runner::{CommandRunner, SshRunner};
use crate::error::ExecError;
use crate::models::Connection;
use crate::ssh_service::{build_command, ConnectOptions};

/// Fail-fast bookkeeping for a single dispatch call.
struct FailFast {
    enabled: bool,
    triggered: Mutex<bool>,
    scope: CancellationToken,
}

impl FailFast {
    fn new(enabled: bool, scope: CancellationToken) -> Self {
        Self {
            enabled,
            triggered: Mutex::new(false),
            scope,
        }
    }

    fn is_triggered(&self) -> bool {
        self.enabled && *self.triggered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a failure. Returns true for the first failure of the call.
    fn trigger(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let first = {
            let mut triggered = self.triggered.lock().unwrap_or_else(PoisonError::into_inner);
            !std::mem::replace(&mut *triggered, true)
        };
        self.scope.cancel();
        first
    }
}

/// Runs a command on many connections with bounded parallelism.
pub struct Dispatcher<R = SshRunner> {
    runner: Arc<R>,
    stdout: SharedSink,
    stderr: SharedSink,
}

impl Default for Dispatcher<SshRunner> {
    fn default() -> Self {
        Self::with_runner(SshRunner::default())
    }
}

impl Dispatcher<SshRunner> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: CommandRunner> Dispatcher<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
            stdout: shared_sink(io::stdout()),
            stderr: shared_sink(io::stderr()),
        }
    }

    /// Where stream mode writes prefixed output. Defaults to the process stdio.
    pub fn with_stream_sinks(mut self, stdout: SharedSink, stderr: SharedSink) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    /// Run `options.command` on every connection.
    ///
    /// Always returns exactly one result per connection, with `result[i]`
    /// belonging to `connections[i]`. Per-host failures are reported in the
    /// results, never as an error of the whole call.
    pub async fn execute(&self, connections: &[Connection], options: &ExecOptions) -> Vec<ExecResult> {
        if connections.is_empty() {
            return Vec::new();
        }

        let parallel = options.effective_parallel();
        info!(
            hosts = connections.len(),
            parallel,
            fail_fast = options.fail_fast,
            stream = options.stream,
            "dispatching command"
        );

        let scope = CancellationToken::new();
        let fail_fast = Arc::new(FailFast::new(options.fail_fast, scope.clone()));
        let semaphore = Arc::new(Semaphore::new(parallel));
        let options = Arc::new(options.clone());
        let (tx, mut rx) = mpsc::channel::<(usize, ExecResult)>(connections.len());

        for (index, connection) in connections.iter().enumerate() {
            let task = HostTask {
                connection: connection.clone(),
                options: Arc::clone(&options),
                runner: Arc::clone(&self.runner),
                semaphore: Arc::clone(&semaphore),
                fail_fast: Arc::clone(&fail_fast),
                scope: scope.clone(),
                stdout: Arc::clone(&self.stdout),
                stderr: Arc::clone(&self.stderr),
            };
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = task.run().await;
                // The receiver outlives every task.
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<Option<ExecResult>> = connections.iter().map(|_| None).collect();
        // Closes once every task has sent or dropped its sender.
        while let Some((index, result)) = rx.recv().await {
            slots[index] = Some(result);
        }
        scope.cancel();

        let results: Vec<ExecResult> = slots
            .into_iter()
            .zip(connections)
            .map(|(slot, connection)| {
                slot.unwrap_or_else(|| {
                    warn!("task for {} ended without a result", connection.id);
                    ExecResult::not_run(
                        connection.clone(),
                        ExecError::TaskAborted("task ended without reporting a result".to_string()),
                    )
                })
            })
            .collect();

        info!(
            hosts = results.len(),
            failed = results.iter().filter(|r| !r.is_success()).count(),
            "dispatch finished"
        );
        results
    }
}

/// Convenience wrapper running over the system ssh client.
pub async fn execute(connections: &[Connection], options: &ExecOptions) -> Vec<ExecResult> {
    Dispatcher::new().execute(connections, options).await
}

struct HostTask<R> {
    connection: Connection,
    options: Arc<ExecOptions>,
    runner: Arc<R>,
    semaphore: Arc<Semaphore>,
    fail_fast: Arc<FailFast>,
    scope: CancellationToken,
    stdout: SharedSink,
    stderr: SharedSink,
}

impl<R: CommandRunner> HostTask<R> {
    async fn run(self) -> ExecResult {
        if self.fail_fast.is_triggered() {
            return self.skipped();
        }

        let _permit = tokio::select! {
            permit = self.semaphore.acquire() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    return ExecResult::not_run(
                        self.connection.clone(),
                        ExecError::TaskAborted(format!("admission failed: {e}")),
                    );
                }
            },
            // Only fail-fast cancels the shared scope while tasks are queued.
            _ = self.scope.cancelled() => return self.skipped(),
        };

        // Fail-fast may have fired while this task was queued.
        if self.fail_fast.is_triggered() {
            return self.skipped();
        }

        let result = self.run_on_host().await;

        if let Some(error) = &result.error {
            warn!("{} failed: {}", self.connection.id, error);
            if self.fail_fast.trigger() {
                info!("fail-fast triggered by {}", self.connection.id);
            }
        }

        result
    }

    fn skipped(&self) -> ExecResult {
        debug!("skipping {} after fail-fast", self.connection.id);
        ExecResult::not_run(self.connection.clone(), ExecError::SkippedFailFast)
    }

    async fn run_on_host(&self) -> ExecResult {
        let start = Instant::now();
        let args = build_command(&self.connection, &ConnectOptions::with_command(&self.options.command));

        let prefix = format!("[{}] ", self.connection.id);
        let mut stdout = HostOutput::new(self.options.stream, &prefix, &self.stdout);
        let mut stderr = HostOutput::new(self.options.stream, &prefix, &self.stderr);

        // Nested scope: a timeout here never cancels sibling hosts.
        let host_scope = self.scope.child_token();

        debug!("running on {}", self.connection.id);
        let run = self.runner.run(&args, &mut stdout, &mut stderr, &host_scope);
        let outcome = match self.options.effective_timeout() {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    host_scope.cancel();
                    Err(ExecError::TimedOut(limit))
                }
            },
            None => run.await,
        };

        let duration = start.elapsed();
        let stdout = stdout.finish();
        let stderr = stderr.finish();

        let (exit_code, error) = match outcome {
            Ok(0) => (0, None),
            Ok(code) => (code, Some(ExecError::ExitStatus(code))),
            Err(e) => (NOT_RUN_EXIT_CODE, Some(e)),
        };

        debug!(
            "{} finished in {:?} with exit code {}",
            self.connection.id, duration, exit_code
        );

        ExecResult {
            connection: self.connection.clone(),
            stdout,
            stderr,
            exit_code,
            error,
            duration,
        }
    }
}

/// Per-host destination for one output stream.
enum HostOutput {
    Capture(Vec<u8>),
    Stream(PrefixWriter),
}

impl HostOutput {
    fn new(stream: bool, prefix: &str, sink: &SharedSink) -> Self {
        if stream {
            Self::Stream(PrefixWriter::new(prefix, Arc::clone(sink)))
        } else {
            Self::Capture(Vec::new())
        }
    }

    /// Captured text, or an empty string once streamed output is flushed.
    fn finish(self) -> String {
        match self {
            Self::Capture(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Self::Stream(mut writer) => {
                if let Err(e) = writer.finish() {
                    warn!("failed to flush streamed output: {}", e);
                }
                String::new()
            }
        }
    }
}

impl Write for HostOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Capture(out) => out.write(buf),
            Self::Stream(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Capture(out) => out.flush(),
            Self::Stream(writer) => writer.flush(),
        }
    }
}
