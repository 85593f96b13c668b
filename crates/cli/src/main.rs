//! chartcheck CLI - Main Entry Point
//!
//! Runs chart pipeline verification scenarios against a locally started
//! dashboard, validates scenario files and probes target readiness.
//!
//! Exit codes: 0 when every scenario passed, 1 when a verification failed,
//! 2 for configuration or usage errors.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{check, probe, run};

/// chartcheck - verify asynchronous chart rendering end to end
#[derive(Parser)]
#[command(name = "chartcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the target, drive the browser and judge the markers
    Run(run::RunArgs),

    /// Validate scenario files without running them
    Check(check::CheckArgs),

    /// Wait for a host and port to accept TCP connections
    Probe(probe::ProbeArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let outcome = match cli.command {
        Commands::Run(args) => run::execute(args, cli.format).await,
        Commands::Check(args) => check::execute(args, cli.format).await,
        Commands::Probe(args) => probe::execute(args).await,
    };

    match outcome {
        Ok(code) => code.into(),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            commands::Outcome::UsageError.into()
        }
    }
}
