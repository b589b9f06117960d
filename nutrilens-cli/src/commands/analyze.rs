//! Analyze command - request a nutrition estimate.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use nutrilens_analysis::load_photo;
use nutrilens_core::{AnalysisPayload, Failure};
use tracing::{debug, info};

use crate::context::{analysis_service, load_settings};
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the analyze command.
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Meal description, e.g. "grilled chicken, 200g".
    pub description: String,

    /// Photo of the meal (jpg, png, webp or heic).
    #[arg(long, short = 'p', value_name = "PATH")]
    pub photo: Option<PathBuf>,
}

/// Runs the analyze command.
///
/// Queued analyses left by earlier runs are resumed alongside this one. Their
/// outcomes are not awaited here: they stay undelivered for `jobs recover`,
/// and any still waiting when this analysis ends are left for the next run.
pub async fn run(args: &AnalyzeArgs, cli: &Cli) -> Result<()> {
    let settings = load_settings(cli).await;
    let mut payload = AnalysisPayload::from_description(args.description.clone());
    if let Some(path) = &args.photo {
        payload = payload.with_photo(load_photo(path).await.map_err(Failure::from)?);
    }

    let service = analysis_service(&settings).await?;

    let recovered = service.queue().recover().await.map_err(Failure::from)?;
    if !recovered.is_empty() {
        info!(count = recovered.len(), "Resumed queued analyses");
    }
    // Closing the handles keeps their outcomes undelivered.
    drop(recovered);

    debug!(has_photo = payload.photo.is_some(), "Starting analysis");
    let outcome = service.analyze_meal().analyze(payload).await;
    service.queue().shutdown().await;
    let estimate = outcome.into_result()?;

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_estimate(&estimate));
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format(&estimate)?);
        }
    }

    Ok(())
}
