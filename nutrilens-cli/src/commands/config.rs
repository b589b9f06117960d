//! Config command - manage configuration.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use nutrilens_core::Failure;
use nutrilens_store::{Settings, default_config_dir};
use tracing::info;

use crate::context::{load_settings, settings_path};
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration.
    Show,

    /// Show configuration paths.
    Path,

    /// Write a settings file with default values.
    Init {
        /// Overwrite an existing settings file.
        #[arg(long)]
        force: bool,
    },
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, cli: &Cli) -> Result<()> {
    match &args.action {
        ConfigAction::Show => show_config(cli).await,
        ConfigAction::Path => show_paths(cli).await,
        ConfigAction::Init { force } => init_config(*force, cli).await,
    }
}

async fn show_config(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli).await;

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_settings(&settings));
            if let Err(e) = settings.validate() {
                println!();
                println!("Warning: {e}");
            }
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&settings)?);
        }
    }

    Ok(())
}

async fn show_paths(cli: &Cli) -> Result<()> {
    let config_dir = default_config_dir();
    let settings_file = settings_path(cli);
    let settings = load_settings(cli).await;

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config dir:    {}", config_dir.display());
            println!("Settings file: {}", settings_file.display());
            println!("Data dir:      {}", settings.data_dir().display());
            println!("Jobs dir:      {}", settings.jobs_dir().display());
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "config_dir": config_dir.display().to_string(),
                "settings_file": settings_file.display().to_string(),
                "data_dir": settings.data_dir().display().to_string(),
                "jobs_dir": settings.jobs_dir().display().to_string(),
            });
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&paths)?);
        }
    }

    Ok(())
}

async fn init_config(force: bool, cli: &Cli) -> Result<()> {
    let path = settings_path(cli);

    if path.exists() && !force {
        bail!(
            "Settings file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    Settings::default().save(&path).await.map_err(Failure::from)?;

    info!(path = %path.display(), "Settings initialised");
    if !cli.quiet {
        println!("Wrote default settings to {}", path.display());
    }

    Ok(())
}
