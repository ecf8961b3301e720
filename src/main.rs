//! codeloop: turn a natural-language task into a Python program that has
//! actually run cleanly inside an isolated Docker container.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod extract;
mod model;
mod orchestrator;
mod sandbox;
mod state;
mod templates;

#[derive(Parser)]
#[command(name = "codeloop")]
#[command(
    author,
    version,
    about = "Generate Python for a task, run it in a Docker sandbox, and retry until it works"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write JSON logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default codeloop.toml and a sample request
    Init {
        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Solve one task: generate, run in the sandbox, retry on failure
    Solve {
        /// The task in plain language
        task: Option<String>,

        /// Read a JSON request ({"task": "..."}) from FILE, or stdin with '-'
        #[arg(long, value_name = "FILE")]
        request: Option<PathBuf>,

        /// Print the final report as JSON instead of progress output
        #[arg(long)]
        json: bool,

        /// Also write the final report to FILE
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Attempt budget, 1 to 3 (default: [run].max_attempts from codeloop.toml)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=3))]
        max_attempts: Option<u32>,
    },

    /// Manage the sandbox execution image
    Image {
        #[command(subcommand)]
        action: commands::image::ImageAction,
    },

    /// Remove sandbox containers left behind by killed runs
    Clean,
}

/// Sets up stderr logging plus an optional JSON file layer.
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if verbose {
        EnvFilter::new("codeloop=debug")
    } else {
        EnvFilter::new("codeloop=info")
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().json().with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let _guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Solve {
            task,
            request,
            json,
            output,
            max_attempts,
        } => {
            let args = commands::solve::SolveArgs {
                task,
                request,
                json,
                output,
                max_attempts,
            };
            if commands::solve::run(args).await? != state::RunStatus::Success {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Image { action } => {
            commands::image::run(action).await?;
        }
        Commands::Clean => {
            commands::clean::run().await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
