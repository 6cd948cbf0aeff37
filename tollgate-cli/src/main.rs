//! `tollgate`: offline tools for call logs and provider configuration

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tollgate_core::clock::{Clock, SystemClock};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Inspect Tollgate call logs and provider configuration", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit diagnostics as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the metrics report from a call log
    Report {
        #[arg(short, long, default_value = "calls.jsonl")]
        log: PathBuf,
    },
    /// Validate a configuration file and print the provider order
    CheckConfig { path: PathBuf },
    /// Show per-provider window usage reconstructed from a call log
    Status {
        #[arg(short, long, default_value = "tollgate.yaml")]
        config: PathBuf,

        #[arg(short, long, default_value = "calls.jsonl")]
        log: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let output = match cli.command {
        Commands::Report { log } => commands::report(&log)?,
        Commands::CheckConfig { path } => commands::check_config(&path)?,
        Commands::Status { config, log } => {
            commands::status(&config, &log, SystemClock::new().now_ms())?
        }
    };
    print!("{}", output);
    Ok(())
}
