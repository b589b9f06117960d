//! Credential command - manage the API key.

use std::io::{BufRead, IsTerminal};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::context::{load_settings, manage_credential};
use crate::output::{CredentialStatusOutput, JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the credential command.
#[derive(Args)]
pub struct CredentialArgs {
    #[command(subcommand)]
    pub action: CredentialAction,
}

/// Credential subcommands.
#[derive(Subcommand)]
pub enum CredentialAction {
    /// Store the API key.
    Set {
        /// The key. Read from stdin when omitted.
        value: Option<String>,
    },

    /// Remove the stored API key.
    Clear,

    /// Show whether an API key is configured.
    Status,
}

/// Runs the credential command.
pub async fn run(args: &CredentialArgs, cli: &Cli) -> Result<()> {
    let settings = load_settings(cli).await;
    let manage = manage_credential(&settings)?;

    match &args.action {
        CredentialAction::Set { value } => {
            let raw = match value {
                Some(value) => value.clone(),
                None => read_secret()?,
            };
            manage.set(&raw).into_result()?;
            if !cli.quiet {
                println!("API key saved ({})", manage.backend_name());
            }
        }
        CredentialAction::Clear => {
            manage.clear().into_result()?;
            if !cli.quiet {
                println!("API key removed");
            }
        }
        CredentialAction::Status => {
            let status = CredentialStatusOutput {
                configured: manage.is_configured(),
                backend: manage.backend_name().to_string(),
            };
            match cli.format {
                OutputFormat::Text => {
                    let formatter = TextFormatter::new(!cli.no_color);
                    println!("{}", formatter.format_credential_status(&status));
                }
                OutputFormat::Json => {
                    println!("{}", JsonFormatter::new(cli.pretty).format(&status)?);
                }
            }
        }
    }

    Ok(())
}

/// Reads one line from stdin.
fn read_secret() -> Result<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprint!("API key: ");
    }

    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .context("Failed to read API key from stdin")?;
    Ok(trim_line_ending(line))
}

fn trim_line_ending(mut line: String) -> String {
    while line.ends_with(['\n', '\r']) {
        line.pop();
    }
    line
}
