//! Text output formatting with colors.

use chrono::{DateTime, Local, Utc};
use nutrilens_core::NutritionEstimate;
use nutrilens_jobs::{AnalysisJob, JobState};
use nutrilens_store::Settings;

use super::json::{CredentialStatusOutput, RecoveredOutput};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

/// Longest description shown in job listings.
const DESCRIPTION_WIDTH: usize = 32;

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Formats a nutrition estimate.
    pub fn format_estimate(&self, estimate: &NutritionEstimate) -> String {
        let mut lines = vec![self.bold("Nutrition Estimate")];

        lines.push(format!(
            "{:<11} {}",
            "Calories:",
            self.green(&format!("{:.0} kcal", estimate.calories))
        ));
        for (label, grams) in [
            ("Protein:", estimate.protein_g),
            ("Carbs:", estimate.carbs_g),
            ("Fat:", estimate.fat_g),
        ] {
            if let Some(grams) = grams {
                lines.push(format!("{label:<11} {grams:.1} g"));
            }
        }
        if let Some(confidence) = estimate.confidence {
            lines.push(format!(
                "{:<11} {}",
                "Confidence:",
                self.dim(&format!("{:.0}%", confidence * 100.0))
            ));
        }

        if !estimate.items.is_empty() {
            lines.push(String::new());
            lines.push(self.bold("Items"));
            for item in &estimate.items {
                let mut line = format!("  • {}", item.name);
                if let Some(grams) = item.grams {
                    line.push_str(&format!("  {grams:.0} g"));
                }
                if let Some(calories) = item.calories {
                    line.push_str(&format!("  {}", self.dim(&format!("{calories:.0} kcal"))));
                }
                lines.push(line);
            }
        }

        lines.join("\n")
    }

    /// Formats the credential status line.
    pub fn format_credential_status(&self, status: &CredentialStatusOutput) -> String {
        if status.configured {
            format!("API key: {} ({})", self.green("configured"), status.backend)
        } else {
            format!(
                "API key: {} ({})\n{}",
                self.yellow("not configured"),
                status.backend,
                self.dim("Run `nutrilens credential set` to add one.")
            )
        }
    }

    /// Header row for job listings.
    pub fn format_jobs_header(&self) -> String {
        self.bold(&format!(
            "{:<36}  {:<10}  {:>5}  {:<16}  {}",
            "ID", "STATE", "TRIES", "CREATED", "MEAL"
        ))
    }

    /// Formats one job as a listing row.
    pub fn format_job_line(&self, job: &AnalysisJob) -> String {
        let state = self.color_for_state(job.state, &format!("{:<10}", job.state.as_str()));
        let mut line = format!(
            "{:<36}  {}  {:>5}  {:<16}  {}",
            job.id.to_string(),
            state,
            job.attempts,
            format_local(job.created_at),
            truncate(&job.payload.description, DESCRIPTION_WIDTH)
        );

        if job.state == JobState::Retrying {
            line.push_str(&self.dim(&format!("  next {}", format_local(job.next_eligible_at))));
        } else if let (true, Some(failure)) = (job.is_terminal(), &job.last_failure) {
            line.push_str(&self.dim(&format!("  {}", failure.kind())));
        }

        line
    }

    /// Formats the outcome of a recovered job.
    pub fn format_recovered(&self, result: &RecoveredOutput) -> String {
        match (&result.estimate, &result.error) {
            (Some(estimate), _) => format!(
                "{}  {}",
                result.id,
                self.green(&format!("{:.0} kcal", estimate.calories))
            ),
            (None, Some(error)) => {
                format!("{}  {} {}", result.id, self.red("Error:"), error.user_message)
            }
            (None, None) => result.id.clone(),
        }
    }

    /// Formats the effective settings.
    pub fn format_settings(&self, settings: &Settings) -> String {
        let domains = if settings.allowed_domains.is_empty() {
            "any".to_string()
        } else {
            settings.allowed_domains.join(", ")
        };

        [
            self.bold("NutriLens Configuration"),
            "─".repeat(40),
            format!("Endpoint:       {}", settings.endpoint),
            format!("Auth header:    {}", settings.auth_header),
            format!("Timeout:        {}s", settings.timeout_secs),
            format!("Allowed hosts:  {domains}"),
            format!("Workers:        {}", settings.workers),
            format!("Credential:     {}", settings.credential_backend),
            format!(
                "Retry:          {} attempts, {}ms base, x{}, {}ms cap, {:.0}% jitter",
                settings.retry.max_attempts,
                settings.retry.base_delay_ms,
                settings.retry.multiplier,
                settings.retry.max_delay_ms,
                settings.retry.jitter * 100.0
            ),
            format!("Data dir:       {}", settings.data_dir().display()),
        ]
        .join("\n")
    }

    // ========================================================================
    // Color/style helpers
    // ========================================================================

    fn color_for_state(&self, state: JobState, text: &str) -> String {
        match state {
            JobState::Succeeded => self.green(text),
            JobState::Exhausted => self.red(text),
            JobState::Retrying => self.yellow(text),
            JobState::Cancelled => self.dim(text),
            JobState::Pending | JobState::Running => self.cyan(text),
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.use_colors {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}

fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Shortens `text` to at most `width` characters, marking the cut.
pub(crate) fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut short: String = text.chars().take(width.saturating_sub(1)).collect();
    short.push('…');
    short
}

// ============================================================================
// Tests
// ============================================================================
