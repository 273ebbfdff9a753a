use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, EnvFilter};

use hop::cli::{self, Cli};

fn log_dir() -> Option<PathBuf> {
    let dir = dirs::cache_dir()?.join("hop").join("logs");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

fn init_logging(verbose: bool) -> Result<()> {
    let directive = if verbose { "hop=debug" } else { "hop=info" };
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let Some(dir) = log_dir() else {
        // No writable cache dir, keep warnings visible on stderr
        fmt()
            .with_max_level(Level::WARN)
            .with_env_filter(EnvFilter::from_default_env().add_directive("hop=warn".parse()?))
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    };

    // Log file named with a timestamp
    let log_file = dir.join(format!("hop_{}.log", Local::now().format("%Y%m%d_%H%M%S")));
    let file = File::create(&log_file)?;

    fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(file)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("Warning: logging disabled: {err}");
    }

    debug!("Starting hop with {:?}", cli.command);

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
