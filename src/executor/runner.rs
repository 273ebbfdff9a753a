//! Process invocation behind a trait so dispatch logic can run against fakes.

use async_trait::async_trait;
use std::io::Write;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::ExecError;
use crate::ssh_service::SSH_BINARY;

const READ_CHUNK: usize = 8 * 1024;

/// Runs one external command to completion.
///
/// Output is forwarded to `stdout` / `stderr` as it arrives. Implementations
/// must return promptly with [`ExecError::Cancelled`] once `cancel` fires.
/// The returned value is the process exit code, zero or not.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(
        &self,
        args: &[String],
        stdout: &mut (dyn Write + Send),
        stderr: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<i32, ExecError>;
}

/// Spawns the system ssh client.
#[derive(Debug, Clone)]
pub struct SshRunner {
    program: String,
}

impl Default for SshRunner {
    fn default() -> Self {
        Self::new(SSH_BINARY)
    }
}

impl SshRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for SshRunner {
    async fn run(
        &self,
        args: &[String],
        stdout: &mut (dyn Write + Send),
        stderr: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<i32, ExecError> {
        // Never start a remote command for a host that was cancelled on admission.
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let outcome = tokio::select! {
            outcome = wait_with_output(&mut child, stdout, stderr) => outcome,
            _ = cancel.cancelled() => Err(ExecError::Cancelled),
        };

        if matches!(outcome, Err(ExecError::Cancelled)) {
            tracing::debug!("killing cancelled {} process", self.program);
            if let Err(e) = child.kill().await {
                tracing::warn!("failed to kill {}: {}", self.program, e);
            }
        }

        outcome
    }
}

async fn wait_with_output(
    child: &mut Child,
    stdout: &mut (dyn Write + Send),
    stderr: &mut (dyn Write + Send),
) -> Result<i32, ExecError> {
    let out_pipe = child.stdout.take();
    let err_pipe = child.stderr.take();

    let (out_res, err_res) = tokio::join!(copy_into(out_pipe, stdout), copy_into(err_pipe, stderr));
    out_res?;
    err_res?;

    let status = child.wait().await?;
    status.code().ok_or(ExecError::Signaled)
}

async fn copy_into<R>(pipe: Option<R>, sink: &mut (dyn Write + Send)) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(());
    };

    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n])?;
    }
    sink.flush()
}
