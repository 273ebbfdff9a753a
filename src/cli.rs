use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{AppConfig, ConfigManager};
use crate::executor::{
    count_errors, format_grouped_output, has_errors, CommandRunner, Dispatcher, ExecOptions,
    SshRunner,
};
use crate::fuzzy::{self, EXACT_MATCH_SCORE};
use crate::models::Connection;
use crate::registry::{Registry, DEFAULT_SSH_PORT};
use crate::resolve::{resolve_target, MatchMethod};
use crate::ssh_service::{build_command_string, connect_to_host, ConnectOptions};

#[derive(Debug, Parser)]
#[command(name = "hop", version, about = "Find servers by loose names and run commands on them")]
pub struct Cli {
    /// Hosts file to use instead of the default one
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress progress and summary messages
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a command on every server matching a target
    Exec(ExecArgs),
    /// Show which connections a target matches
    Resolve {
        target: String,
        /// Keep only connections carrying this tag
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List all connections, grouped by project and environment
    List {
        #[arg(long)]
        json: bool,
        /// One table without grouping
        #[arg(long)]
        flat: bool,
    },
    /// Open an interactive session on the connection with this exact id
    Connect(ConnectArgs),
    /// Check the hosts file for problems
    Validate,
    /// `hop <query>`: open a session on the best fuzzy match
    #[command(external_subcommand)]
    Quick(Vec<String>),
}

#[derive(Debug, Parser)]
pub struct ConnectArgs {
    pub target: String,

    /// Print the ssh command instead of running it
    #[arg(long)]
    pub dry_run: bool,

    /// Force pseudo-terminal allocation
    #[arg(short = 't', long = "tty")]
    pub force_tty: bool,

    /// Remote command, after `--`
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl ConnectArgs {
    /// Arguments of a bare `hop <query> [flags]` invocation.
    pub fn from_quick(args: &[String]) -> Result<Self> {
        Self::try_parse_from(std::iter::once("hop").chain(args.iter().map(String::as_str)))
            .context("invalid quick-connect arguments")
    }

    fn options(&self) -> ConnectOptions {
        ConnectOptions {
            dry_run: self.dry_run,
            force_tty: self.force_tty,
            command: (!self.command.is_empty()).then(|| self.command.join(" ")),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Group name, project-env pair, glob, or fuzzy query
    pub target: String,

    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Maximum hosts running at once
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Per-host timeout, e.g. 500ms, 30s, 5m, 1h or bare seconds
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Stop dispatching after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Print output as it arrives, prefixed with the host id
    #[arg(long)]
    pub stream: bool,

    /// Print the ssh command for each host without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Keep only connections carrying this tag
    #[arg(long)]
    pub tag: Option<String>,
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse `30s`, `1m30s`, `1.5s`, `250ms`, `2h`, or a bare number of seconds.
pub fn parse_timeout(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let invalid = || format!("invalid timeout '{value}'");
    let too_large = || format!("timeout too large: '{value}'");

    if value.is_empty() {
        return Err(invalid());
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().map(Duration::from_secs).map_err(|_| too_large());
    }

    let mut total: u128 = 0;
    let mut rest = value;
    while !rest.is_empty() {
        let is_number = |c: char| c.is_ascii_digit() || c == '.';
        let (number, tail) = rest.split_at(rest.find(|c: char| !is_number(c)).unwrap_or(rest.len()));
        let (unit, tail) = tail.split_at(tail.find(is_number).unwrap_or(tail.len()));
        rest = tail;

        let scale = unit_nanos(unit)
            .ok_or_else(|| format!("invalid timeout unit '{unit}' in '{value}'"))?;

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
            return Err(invalid());
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| too_large())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(too_large)?;

        if !frac.is_empty() {
            // Digits past nanosecond precision cannot change the result.
            let digits = &frac[..frac.len().min(18)];
            let fraction: u128 = digits.parse().map_err(|_| invalid())?;
            nanos = nanos
                .checked_add(fraction * scale / 10u128.pow(digits.len() as u32))
                .ok_or_else(too_large)?;
        }

        total = total.checked_add(nanos).ok_or_else(too_large)?;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| too_large())?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut manager = ConfigManager::new()?;
    if let Some(path) = &cli.config {
        manager = manager.with_hosts_file(path);
    }

    let config = manager.load_config()?;
    let registry = manager.load_registry()?;

    let mut out = io::stdout();
    let mut err = io::stderr();

    match &cli.command {
        Commands::Exec(args) => {
            let dispatcher = Dispatcher::with_runner(SshRunner::new(&config.ssh_binary));
            run_exec(args, &config, &registry, &dispatcher, cli.quiet, &mut out, &mut err).await
        }
        Commands::Resolve { target, tag, json } => {
            run_resolve(target, tag.as_deref(), *json, &registry, &mut out, &mut err)
        }
        Commands::List { json, flat } => run_list(*json, *flat, &registry, &mut out),
        Commands::Validate => run_validate(&registry, &manager, &mut err),
        Commands::Connect(args) => {
            let conn = find_exact(&args.target, &registry)?;
            open_session(conn, args, &config, cli.quiet, &mut err).await
        }
        Commands::Quick(raw) => {
            let args = ConnectArgs::from_quick(raw)?;
            let conn = pick_connection(&args.target, &registry, cli.quiet, &mut err)?;
            open_session(conn, &args, &config, cli.quiet, &mut err).await
        }
    }
}

async fn open_session(
    conn: Connection,
    args: &ConnectArgs,
    config: &AppConfig,
    quiet: bool,
    err: &mut dyn Write,
) -> Result<()> {
    if !quiet {
        writeln!(err, "Connecting to {} ({})...", conn.id, conn.host)?;
    }

    let opts = args.options();
    let binary = config.ssh_binary.clone();
    tokio::task::spawn_blocking(move || connect_to_host(&conn, &opts, &binary))
        .await
        .context("ssh session task failed")?
}

/// Exact id lookup used by `hop connect`.
fn find_exact(id: &str, registry: &Registry) -> Result<Connection> {
    fuzzy::find_by_id(id, &registry.connections)
        .cloned()
        .ok_or_else(|| anyhow!("connection '{}' not found", id))
}

/// Resolve a target and apply the optional tag filter. Zero hosts is an error.
fn select_targets(target: &str, tag: Option<&str>, registry: &Registry) -> Result<(Vec<Connection>, MatchMethod)> {
    let resolved = resolve_target(target, registry)?;
    let method = resolved.method;
    let mut connections = resolved.connections;

    if let Some(tag) = tag.filter(|t| !t.is_empty()) {
        connections = fuzzy::match_by_tag(tag, &connections);
        if connections.is_empty() {
            bail!("no connections matching '{}' with tag '{}'", target, tag);
        }
    }

    if connections.is_empty() {
        bail!("no connections matching '{}'", target);
    }

    Ok((connections, method))
}

pub async fn run_exec<R: CommandRunner>(
    args: &ExecArgs,
    config: &AppConfig,
    registry: &Registry,
    dispatcher: &Dispatcher<R>,
    quiet: bool,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<()> {
    let command = args.command.join(" ");
    let (connections, method) = select_targets(&args.target, args.tag.as_deref(), registry)?;
    tracing::info!("'{}' resolved by {} to {} host(s)", args.target, method, connections.len());

    let timeout = match (args.timeout, config.default_timeout.as_deref()) {
        (Some(timeout), _) => Some(timeout),
        (None, Some(default)) => {
            Some(parse_timeout(default).map_err(|e| anyhow!("default_timeout in config: {e}"))?)
        }
        (None, None) => None,
    };

    if args.dry_run {
        writeln!(err, "Would execute on {} server(s):\n", connections.len())?;
        let opts = ConnectOptions::with_command(&command);
        for conn in &connections {
            writeln!(out, "  {}: {}", conn.id, build_command_string(conn, &opts))?;
        }
        return Ok(());
    }

    if !quiet {
        writeln!(err, "Executing on {} server(s)...", connections.len())?;
        if args.stream {
            writeln!(err)?;
        }
    }

    let options = ExecOptions::new(command)
        .with_parallel(args.parallel.unwrap_or(config.default_parallel))
        .with_timeout(timeout)
        .with_fail_fast(args.fail_fast)
        .with_stream(args.stream);

    let results = dispatcher.execute(&connections, &options).await;

    if !args.stream {
        write!(out, "{}", format_grouped_output(&results))?;
        out.flush()?;
    }

    let failed = count_errors(&results);
    if !quiet {
        if failed > 0 {
            writeln!(err, "\n{} of {} server(s) failed", failed, results.len())?;
        } else {
            writeln!(err, "\nCompleted on {} server(s)", results.len())?;
        }
    }

    if has_errors(&results) {
        bail!("command failed on {} server(s)", failed);
    }

    Ok(())
}

#[derive(Serialize)]
struct ResolveReport<'a> {
    target: &'a str,
    method: MatchMethod,
    connections: &'a [Connection],
}

pub fn run_resolve(
    target: &str,
    tag: Option<&str>,
    json: bool,
    registry: &Registry,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<()> {
    let (connections, method) = select_targets(target, tag, registry)?;

    if json {
        let report = ResolveReport {
            target,
            method,
            connections: &connections,
        };
        serde_json::to_writer_pretty(&mut *out, &report).context("Failed to serialize result")?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(err, "Target:   {target}")?;
    writeln!(err, "Matched:  {} ({} connection(s))", method, connections.len())?;
    if let Some(tag) = tag {
        writeln!(err, "Tag:      {tag}")?;
    }
    writeln!(err)?;

    write_table(out, &connections)?;
    Ok(())
}

pub fn run_list(json: bool, flat: bool, registry: &Registry, out: &mut dyn Write) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, &registry.connections)
            .context("Failed to serialize connections")?;
        writeln!(out)?;
        return Ok(());
    }

    if flat {
        write_table(out, &registry.connections)?;
    } else {
        write_grouped(out, &registry.connections)?;
    }
    Ok(())
}

// Loading already rejected an invalid hosts file with every problem listed.
fn run_validate(registry: &Registry, manager: &ConfigManager, err: &mut dyn Write) -> Result<()> {
    writeln!(
        err,
        "{} is valid: {} connection(s), {} group(s)",
        manager.hosts_path().display(),
        registry.connections.len(),
        registry.groups.len()
    )?;
    Ok(())
}

/// Best fuzzy match for an interactive session. Other candidates are listed.
fn pick_connection(query: &str, registry: &Registry, quiet: bool, err: &mut dyn Write) -> Result<Connection> {
    let matches = fuzzy::find_matches(query, &registry.connections);
    let Some(best) = matches.first() else {
        bail!("no connections matching '{}'", query);
    };

    if matches.len() > 1 && best.score < EXACT_MATCH_SCORE && !quiet {
        writeln!(err, "Multiple matches for '{query}', using the best one:")?;
        for m in &matches {
            writeln!(err, "  {} ({})", m.connection.id, m.connection.host)?;
        }
    }

    Ok(best.connection.clone())
}

type Row = [String; 4];

fn header_row() -> Row {
    ["ID".to_string(), "HOST".to_string(), "PORT".to_string(), "TAGS".to_string()]
}

fn connection_row(conn: &Connection, name: String) -> Row {
    let host = match conn.effective_user() {
        Some(user) => format!("{user}@{}", conn.host),
        None => conn.host.clone(),
    };
    [
        name,
        host,
        conn.port.unwrap_or(DEFAULT_SSH_PORT).to_string(),
        conn.tags.join(", "),
    ]
}

/// Column-aligned rows; `None` is a blank separator line.
fn write_rows(out: &mut dyn Write, rows: &[Option<Row>]) -> io::Result<()> {
    let mut widths = [0usize; 3];
    for row in rows.iter().flatten() {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    for row in rows {
        let Some(row) = row else {
            writeln!(out)?;
            continue;
        };
        let line = format!(
            "{:<w0$}  {:<w1$}  {:<w2$}  {}",
            row[0],
            row[1],
            row[2],
            row[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
        );
        writeln!(out, "{}", line.trim_end())?;
    }
    out.flush()
}

fn write_table(out: &mut dyn Write, connections: &[Connection]) -> io::Result<()> {
    let mut rows = vec![Some(header_row())];
    rows.extend(connections.iter().map(|c| Some(connection_row(c, c.id.clone()))));
    write_rows(out, &rows)
}

/// Connections without a project first, then one block per project with
/// `[env]` sub-headings. Names drop the redundant `project-` / `env-` prefix.
fn write_grouped(out: &mut dyn Write, connections: &[Connection]) -> io::Result<()> {
    let mut groups: BTreeMap<&str, BTreeMap<&str, Vec<&Connection>>> = BTreeMap::new();
    for conn in connections {
        groups
            .entry(conn.project())
            .or_default()
            .entry(conn.env())
            .or_default()
            .push(conn);
    }

    let blank = |text: String| Some([text, String::new(), String::new(), String::new()]);
    let mut rows = Vec::new();

    for (i, (project, envs)) in groups.iter().enumerate() {
        if project.is_empty() {
            rows.push(Some(header_row()));
            for conn in envs.values().flatten() {
                rows.push(Some(connection_row(conn, short_name(conn))));
            }
            continue;
        }

        if i > 0 {
            rows.push(None);
        }
        rows.push(blank(project.to_string()));
        rows.push(Some(header_row()));
        for (env, conns) in envs {
            let indent = if env.is_empty() { "  " } else { "    " };
            if !env.is_empty() {
                rows.push(blank(format!("  [{env}]")));
            }
            for conn in conns {
                rows.push(Some(connection_row(conn, format!("{indent}{}", short_name(conn)))));
            }
        }
    }

    write_rows(out, &rows)
}

fn short_name(conn: &Connection) -> String {
    let mut name = conn.id.as_str();
    for prefix in [conn.project(), conn.env()] {
        if !prefix.is_empty() {
            if let Some(rest) = name.strip_prefix(&format!("{prefix}-")) {
                name = rest;
            }
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new(vec![
            Connection::new("web-1", "10.0.0.1")
                .with_user("deploy")
                .with_project_env("shop", "prod")
                .with_tags(["web"]),
            Connection::new("web-2", "10.0.0.2")
                .with_user("deploy")
                .with_port(2222)
                .with_project_env("shop", "prod")
                .with_tags(["web"]),
            Connection::new("db-1", "10.0.1.1")
                .with_user("postgres")
                .with_project_env("shop", "prod")
                .with_tags(["database"]),
        ])
        .with_group("production", ["web-1", "web-2", "db-1"])
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_timeout("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_timeout("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_timeout("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_timeout("45"), Ok(Duration::from_secs(45)));
        assert!(parse_timeout("").is_err());
        assert!(parse_timeout("10d").is_err());
        assert!(parse_timeout("fast").is_err());
        assert!(parse_timeout("1m30").is_err());
        assert!(parse_timeout("1..5s").is_err());
    }

    #[test]
    fn test_parse_timeout_compound_and_fractional() {
        assert_eq!(parse_timeout("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_timeout("1h2m3s"), Ok(Duration::from_secs(3723)));
        assert_eq!(parse_timeout("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_timeout(".25m"), Ok(Duration::from_secs(15)));
        assert_eq!(parse_timeout("0.3s"), Ok(Duration::from_millis(300)));
        assert_eq!(parse_timeout("2s500ms"), Ok(Duration::from_millis(2500)));
    }

    #[test]
    fn test_parse_timeout_rejects_overflow() {
        let err = parse_timeout("400000000000000000h").unwrap_err();
        assert!(err.starts_with("timeout too large"), "{err}");
        assert!(parse_timeout("99999999999999999999999").unwrap_err().starts_with("timeout too large"));
        assert!(parse_timeout("99999999999999999999999999999999999999999ms")
            .unwrap_err()
            .starts_with("timeout too large"));
    }

    #[test]
    fn test_exec_args_keep_remote_command_flags() {
        let cli = Cli::try_parse_from([
            "hop", "exec", "--parallel", "2", "--fail-fast", "web*", "ls", "-la", "/tmp",
        ])
        .unwrap();

        let Commands::Exec(args) = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(args.target, "web*");
        assert_eq!(args.command, vec!["ls", "-la", "/tmp"]);
        assert_eq!(args.parallel, Some(2));
        assert!(args.fail_fast);
    }

    #[test]
    fn test_exec_requires_a_command() {
        assert!(Cli::try_parse_from(["hop", "exec", "web*"]).is_err());
    }

    #[test]
    fn test_connect_trailing_command() {
        let cli = Cli::try_parse_from(["hop", "-q", "connect", "web-1", "-t", "--", "tail", "-f", "log"]).unwrap();
        assert!(cli.quiet);
        let Commands::Connect(args) = cli.command else {
            panic!("expected connect");
        };
        assert_eq!(args.target, "web-1");
        assert!(args.force_tty);
        assert_eq!(args.options().command.as_deref(), Some("tail -f log"));
    }

    #[test]
    fn test_connect_needs_exact_id() {
        let registry = registry();
        assert_eq!(find_exact("db-1", &registry).unwrap().host, "10.0.1.1");

        let err = find_exact("web", &registry).unwrap_err();
        assert_eq!(err.to_string(), "connection 'web' not found");
    }

    #[test]
    fn test_bare_query_is_quick_connect() {
        let cli = Cli::try_parse_from(["hop", "db", "--dry-run"]).unwrap();
        let Commands::Quick(raw) = cli.command else {
            panic!("expected quick connect");
        };
        assert_eq!(raw, vec!["db", "--dry-run"]);

        let args = ConnectArgs::from_quick(&raw).unwrap();
        assert_eq!(args.target, "db");
        assert!(args.dry_run);

        let conn = pick_connection(&args.target, &registry(), true, &mut Vec::new()).unwrap();
        assert_eq!(conn.id, "db-1");
    }

    #[test]
    fn test_quick_connect_exact_id_wins_without_listing() {
        let mut err = Vec::new();
        let conn = pick_connection("web-1", &registry(), false, &mut err).unwrap();
        assert_eq!(conn.id, "web-1");
        assert!(err.is_empty());

        let conn = pick_connection("web", &registry(), false, &mut err).unwrap();
        assert!(conn.id.starts_with("web-"));
        assert!(String::from_utf8(err).unwrap().starts_with("Multiple matches for 'web'"));
    }

    #[test]
    fn test_resolve_prints_method_and_table() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        run_resolve("production", None, false, &registry(), &mut out, &mut err).unwrap();

        let err = String::from_utf8(err).unwrap();
        assert!(err.contains("Matched:  named group (3 connection(s))"));

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[2].contains("deploy@10.0.0.2"));
        assert!(lines[2].contains("2222"));
    }

    #[test]
    fn test_resolve_json() {
        let mut out = Vec::new();
        run_resolve("web*", None, true, &registry(), &mut out, &mut Vec::new()).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["method"], "glob");
        assert_eq!(value["connections"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_tag_filter_without_hits_is_an_error() {
        let err = run_resolve("web*", Some("database"), false, &registry(), &mut Vec::new(), &mut Vec::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "no connections matching 'web*' with tag 'database'");
    }

    #[test]
    fn test_list_json() {
        let mut out = Vec::new();
        run_list(true, false, &registry(), &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 3);
        assert_eq!(value[2]["id"], "db-1");
    }

    #[test]
    fn test_list_groups_by_project_and_env() {
        let registry = Registry::new(vec![
            Connection::new("shop-prod-web", "w1").with_user("u").with_project_env("shop", "prod"),
            Connection::new("jump", "j").with_user("u"),
            Connection::new("shop-dev-web", "w2").with_user("u").with_project_env("shop", "dev"),
            Connection::new("site", "b1").with_user("u").with_project_env("blog", ""),
        ]);

        let mut out = Vec::new();
        run_list(false, false, &registry, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().map(str::trim_end).collect();

        assert_eq!(
            lines,
            vec![
                "ID        HOST  PORT  TAGS",
                "jump      u@j   22",
                "",
                "blog",
                "ID        HOST  PORT  TAGS",
                "  site    u@b1  22",
                "",
                "shop",
                "ID        HOST  PORT  TAGS",
                "  [dev]",
                "    web   u@w2  22",
                "  [prod]",
                "    web   u@w1  22",
            ]
        );
    }

    #[test]
    fn test_list_flat() {
        let mut out = Vec::new();
        run_list(false, true, &registry(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let ids: Vec<&str> = text.lines().skip(1).filter_map(|l| l.split_whitespace().next()).collect();
        assert_eq!(ids, vec!["web-1", "web-2", "db-1"]);
    }

    #[tokio::test]
    async fn test_exec_dry_run_prints_commands() {
        let cli = Cli::try_parse_from(["hop", "exec", "--dry-run", "--tag", "web", "production", "uptime"]).unwrap();
        let Commands::Exec(args) = cli.command else {
            panic!("expected exec");
        };

        let mut out = Vec::new();
        let mut err = Vec::new();
        run_exec(
            &args,
            &AppConfig::default(),
            &registry(),
            &Dispatcher::new(),
            false,
            &mut out,
            &mut err,
        )
        .await
        .unwrap();

        assert!(String::from_utf8(err).unwrap().starts_with("Would execute on 2 server(s):"));
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "  web-1: ssh deploy@10.0.0.1 uptime\n  web-2: ssh -p 2222 deploy@10.0.0.2 uptime\n"
        );
    }

    #[tokio::test]
    async fn test_exec_without_matches_fails_before_dispatch() {
        let cli = Cli::try_parse_from(["hop", "exec", "cache-*", "uptime"]).unwrap();
        let Commands::Exec(args) = cli.command else {
            panic!("expected exec");
        };

        let err = run_exec(
            &args,
            &AppConfig::default(),
            &registry(),
            &Dispatcher::new(),
            true,
            &mut Vec::new(),
            &mut Vec::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "no connections matching 'cache-*'");
    }
}
