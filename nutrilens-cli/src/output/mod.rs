//! Output formatting for CLI.

mod json;
mod text;

pub use json::{CredentialStatusOutput, JobOutput, JsonFormatter, RecoveredOutput};
pub use text::TextFormatter;
