//! flowshift command-line interface.
//!
//! Exit codes: 0 success, 1 total failure, 2 partial failure, 3 configuration
//! or I/O error.

mod commands;
mod config;
mod error;

use clap::{Parser, Subcommand};
use commands::{EXIT_ERROR, TransferArgs};
use config::CliConfig;
use error::CliError;
use std::path::PathBuf;
use std::process::ExitCode;

/// flowshift - migrate workflows between automation platform instances
#[derive(Parser)]
#[command(name = "flowshift")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: ./flowshift.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check an export for duplicate ids, duplicate names and unresolved calls
    Validate {
        /// Workflow export (JSON array or single workflow)
        export: PathBuf,

        /// Exit with a failure code when any issue is found
        #[arg(long)]
        strict: bool,

        /// Also write the report to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the dependency order, cycle group and graph statistics
    Graph {
        /// Workflow export (JSON array or single workflow)
        export: PathBuf,
    },

    /// Migrate workflows to the destination instance
    Transfer(TransferArgs),

    /// Re-verify a previous migration against the destination
    Verify {
        /// Read the source batch from an export file instead of the source instance
        #[arg(long)]
        from_file: Option<PathBuf>,
    },
}

async fn run(cli: Cli) -> flowshift_core::Result<u8, CliError> {
    let config = CliConfig::load(cli.config.as_deref()).map_err(|e| CliError::Config {
        details: e.to_string(),
    })?;

    match cli.command {
        Commands::Validate {
            export,
            strict,
            output,
        } => commands::validate(&config, &export, strict, output.as_deref()),
        Commands::Graph { export } => commands::graph(&config, &export),
        Commands::Transfer(args) => commands::transfer(&config, &args).await,
        Commands::Verify { from_file } => commands::verify(&config, from_file.as_deref()).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    // Logs go to stderr; stdout carries the JSON results.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(report) => {
            tracing::error!(error = %report.current_context(), "command failed");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
