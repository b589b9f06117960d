// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! NutriLens CLI - meal analysis from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Store the API key (read from stdin when omitted)
//! nutrilens credential set
//!
//! # Analyze a meal
//! nutrilens analyze "grilled chicken, 200g"
//!
//! # Analyze a photo
//! nutrilens analyze "lunch" --photo plate.jpg
//!
//! # Inspect and cancel queued analyses
//! nutrilens jobs list
//! nutrilens jobs cancel 0b6f1c2e-1d3a-4d8e-9a57-3f1c2d4b5a6e
//!
//! # JSON output
//! nutrilens --format json --pretty jobs list
//! ```

mod commands;
mod context;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use nutrilens_core::{ErrorKind, Failure};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{analyze, config, credential, jobs};

// ============================================================================
// CLI Definition
// ============================================================================

/// NutriLens CLI - meal analysis.
#[derive(Parser)]
#[command(name = "nutrilens")]
#[command(about = "Nutrition estimates for your meals")]
#[command(long_about = r#"
NutriLens turns a meal description or photo into a nutrition estimate.

Analyses are queued durably: transient failures are retried with backoff,
and queued work survives restarts.

Examples:
  nutrilens credential set                  # Store the API key (stdin)
  nutrilens analyze "grilled chicken, 200g" # Analyze a meal
  nutrilens jobs list                       # Show queued analyses
  nutrilens config init                     # Write default settings
"#)]
#[command(version)]
#[command(author = "NutriLens Contributors")]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to the platform config dir).
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Manage the API credential.
    Credential(credential::CredentialArgs),

    /// Analyze a meal.
    #[command(visible_alias = "a")]
    Analyze(analyze::AnalyzeArgs),

    /// Inspect and control queued analyses.
    #[command(visible_alias = "j")]
    Jobs(jobs::JobsArgs),

    /// Manage configuration.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// No API credential configured.
    CredentialMissing = 2,
    /// Invalid input or settings.
    InvalidInput = 3,
    /// The upstream API rejected the request or its answer was unreadable.
    Rejected = 4,
    /// The upstream API stayed unavailable after all retries.
    Unavailable = 5,
    /// The analysis was cancelled.
    Cancelled = 6,
}

impl From<ErrorKind> for ExitCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::CredentialMissing => ExitCode::CredentialMissing,
            ErrorKind::Validation => ExitCode::InvalidInput,
            ErrorKind::ClientError | ErrorKind::InvalidResponse => ExitCode::Rejected,
            ErrorKind::ServerError | ErrorKind::NetworkError => ExitCode::Unavailable,
            ErrorKind::Cancelled => ExitCode::Cancelled,
            ErrorKind::Storage => ExitCode::Error,
        }
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return; // No logging in quiet mode
    }

    let filter = if verbose {
        EnvFilter::new("nutrilens=debug,info")
    } else {
        EnvFilter::new("nutrilens=warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Credential(args) => credential::run(args, &cli).await,
        Commands::Analyze(args) => analyze::run(args, &cli).await,
        Commands::Jobs(args) => jobs::run(args, &cli).await,
        Commands::Config(args) => config::run(args, &cli).await,
    };

    if let Err(e) = result {
        let code = report(&e, &cli);
        std::process::exit(code as i32);
    }

    Ok(())
}

/// Prints a command error and picks the exit code.
fn report(error: &anyhow::Error, cli: &Cli) -> ExitCode {
    let Some(failure) = error.downcast_ref::<Failure>() else {
        if !cli.quiet {
            eprintln!("Error: {error:#}");
        }
        return ExitCode::Error;
    };

    if !cli.quiet {
        eprintln!("Error: {}", failure.user_message());
        // Validation details name the offending value; show them always.
        if cli.verbose || failure.kind() == ErrorKind::Validation {
            eprintln!("  {} ({})", failure.message(), failure.kind());
        }
    }
    ExitCode::from(failure.kind())
}
