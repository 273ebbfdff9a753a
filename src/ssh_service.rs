use anyhow::{Context, Result};
use std::process::{Command, Stdio};

use crate::models::Connection;
use crate::registry::DEFAULT_SSH_PORT;

pub const SSH_BINARY: &str = "ssh";

/// Per-invocation knobs that are not part of the stored connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub dry_run: bool,
    pub force_tty: bool,
    pub command: Option<String>,
    pub extra_args: Vec<String>,
}

impl ConnectOptions {
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Default::default()
        }
    }
}

/// Arguments for the ssh client, without the program name.
///
/// Order: `[-t] [-p port] [-i identity] [-J proxy] [-A] [-o k=v]* [extra] [user@]host [command]`
pub fn build_command(conn: &Connection, opts: &ConnectOptions) -> Vec<String> {
    let mut args = Vec::new();

    if opts.force_tty {
        args.push("-t".to_string());
    }

    if let Some(port) = conn.port.filter(|p| *p != 0 && *p != DEFAULT_SSH_PORT) {
        args.push("-p".to_string());
        args.push(port.to_string());
    }

    if let Some(identity) = conn.identity_file.as_deref().filter(|s| !s.is_empty()) {
        args.push("-i".to_string());
        args.push(expand_home(identity));
    }

    if let Some(proxy) = conn.proxy_jump.as_deref().filter(|s| !s.is_empty()) {
        args.push("-J".to_string());
        args.push(proxy.to_string());
    }

    if conn.forward_agent {
        args.push("-A".to_string());
    }

    for (key, value) in &conn.options {
        args.push("-o".to_string());
        args.push(format!("{key}={value}"));
    }

    args.extend(opts.extra_args.iter().cloned());

    let destination = match conn.effective_user() {
        Some(user) => format!("{user}@{}", conn.host),
        None => conn.host.clone(),
    };
    args.push(destination);

    if let Some(command) = opts.command.as_deref().filter(|c| !c.is_empty()) {
        args.push(command.to_string());
    }

    args
}

/// Human-readable command line. Quoting is for display only.
pub fn build_command_string(conn: &Connection, opts: &ConnectOptions) -> String {
    let args: Vec<String> = build_command(conn, opts)
        .iter()
        .map(|arg| quote_arg(arg))
        .collect();
    format!("{SSH_BINARY} {}", args.join(" "))
}

fn quote_arg(arg: &str) -> String {
    if arg.contains(&[' ', '\t', '\n', '"', '\''][..]) {
        format!("{arg:?}")
    } else {
        arg.to_string()
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}

/// Interactive session with the terminal handed over to ssh.
pub fn connect_to_host(conn: &Connection, opts: &ConnectOptions, ssh_binary: &str) -> Result<()> {
    let args = build_command(conn, opts);

    if opts.dry_run {
        println!("{}", build_command_string(conn, opts));
        return Ok(());
    }

    tracing::info!("Connecting to {} via {}", conn.id, ssh_binary);

    let status = Command::new(ssh_binary)
        .args(&args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("Failed to execute {} for {}", ssh_binary, conn.id))?;

    if !status.success() {
        tracing::error!("ssh session for {} exited with {}", conn.id, status);
        anyhow::bail!("ssh to {} exited with {}", conn.id, status);
    }

    tracing::info!("SSH session for {} ended.", conn.id);
    Ok(())
}

/// Map well-known OpenSSH client failures found in `stderr` to a hint.
pub fn diagnose(stderr: &str, conn: &Connection) -> Option<String> {
    let port = conn.port.filter(|p| *p != 0).unwrap_or(DEFAULT_SSH_PORT);

    let hint = if stderr.contains("Permission denied") {
        let identity = conn
            .identity_file
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("~/.ssh/id_rsa");
        format!(
            "Check your SSH key permissions. Try: ssh-add {identity}, or check that {} has the correct public key.",
            conn.host
        )
    } else if stderr.contains("Connection refused") {
        format!(
            "SSH service may not be running on {}:{port}. Check that the SSH daemon is running and the port is correct.",
            conn.host
        )
    } else if stderr.contains("Host key verification failed") {
        format!(
            "The host key has changed or is unknown. If this is expected, run: ssh-keygen -R {}",
            conn.host
        )
    } else if stderr.contains("Connection timed out") || stderr.contains("Operation timed out") {
        format!(
            "Connection timed out reaching {}. Check network connectivity and firewall rules.",
            conn.host
        )
    } else if stderr.contains("No route to host") {
        format!(
            "Cannot reach {}. Check network connectivity and that the hostname resolves correctly.",
            conn.host
        )
    } else if stderr.contains("Could not resolve hostname") {
        format!(
            "Could not resolve hostname {}. Check the hostname spelling or DNS configuration.",
            conn.host
        )
    } else if stderr.contains("Too many authentication failures") {
        "Too many authentication failures. Try: ssh-add -D && ssh-add ~/.ssh/your_key".to_string()
    } else {
        return None;
    };

    Some(hint)
}
