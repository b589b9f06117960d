//! Jobs command - inspect and control queued analyses.

use anyhow::Result;
use clap::{Args, Subcommand};
use futures::future::join_all;
use nutrilens_core::Failure;
use nutrilens_jobs::JobId;
use tracing::info;

use crate::context::{analysis_service, load_settings};
use crate::output::{JobOutput, JsonFormatter, RecoveredOutput, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the jobs command.
#[derive(Args)]
pub struct JobsArgs {
    #[command(subcommand)]
    pub action: JobsAction,
}

/// Jobs subcommands.
#[derive(Subcommand)]
pub enum JobsAction {
    /// List all analyses, oldest first.
    List,

    /// Cancel a queued or running analysis.
    Cancel {
        /// Job id.
        id: JobId,
    },

    /// Resume interrupted analyses and wait for them.
    Recover,
}

/// Runs the jobs command.
pub async fn run(args: &JobsArgs, cli: &Cli) -> Result<()> {
    let settings = load_settings(cli).await;
    let service = analysis_service(&settings).await?;
    let queue = service.queue();

    match &args.action {
        JobsAction::List => {
            let jobs = queue.jobs().await.map_err(Failure::from)?;
            match cli.format {
                OutputFormat::Text => {
                    let formatter = TextFormatter::new(!cli.no_color);
                    if jobs.is_empty() {
                        println!("No analyses");
                    } else {
                        println!("{}", formatter.format_jobs_header());
                        for job in &jobs {
                            println!("{}", formatter.format_job_line(job));
                        }
                    }
                }
                OutputFormat::Json => {
                    let output: Vec<JobOutput> = jobs.iter().map(JobOutput::from).collect();
                    println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
                }
            }
        }
        JobsAction::Cancel { id } => {
            let cancelled = queue.cancel(*id).await.map_err(Failure::from)?;
            if cancelled {
                info!(job_id = %id, "Cancelled");
            }
            match cli.format {
                OutputFormat::Text if !cli.quiet => {
                    if cancelled {
                        println!("Cancelled {id}");
                    } else {
                        println!("{id} had already finished");
                    }
                }
                OutputFormat::Text => {}
                OutputFormat::Json => {
                    let output = serde_json::json!({"id": id, "cancelled": cancelled});
                    println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
                }
            }
        }
        JobsAction::Recover => {
            let handles = queue.recover().await.map_err(Failure::from)?;
            let ids: Vec<JobId> = handles.iter().map(nutrilens_jobs::JobHandle::id).collect();
            let outcomes = join_all(handles.into_iter().map(|h| h.outcome())).await;
            queue.shutdown().await;

            let results: Vec<RecoveredOutput> = ids
                .into_iter()
                .zip(outcomes)
                .map(|(id, outcome)| RecoveredOutput::new(id, outcome))
                .collect();

            match cli.format {
                OutputFormat::Text => {
                    let formatter = TextFormatter::new(!cli.no_color);
                    if results.is_empty() {
                        println!("Nothing to recover");
                    }
                    for result in &results {
                        println!("{}", formatter.format_recovered(result));
                    }
                }
                OutputFormat::Json => {
                    println!("{}", JsonFormatter::new(cli.pretty).format(&results)?);
                }
            }
        }
    }

    Ok(())
}
