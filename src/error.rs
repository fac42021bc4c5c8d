//! Error types for a recap run
//!
//! Errors are classified by how a run should react:
//! - Retryable: network issues, rate limits, a failed publish
//! - NonRetryable: malformed export, bad configuration, corrupt state files
//!
//! Partial-parse problems (a bad node, an unparseable summary section) are
//! never errors; they are logged and skipped.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Error types for a recap run
#[derive(Debug, Error)]
pub enum RecapError {
    // Input
    #[error("Malformed export: {0}")]
    MalformedExport(String),

    #[error("Export archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    // Configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Persisted state
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt state file {path}: {message}")]
    CorruptState { path: PathBuf, message: String },

    // External collaborators
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Summarizer failed: {0}")]
    Summarizer(String),

    #[error("Publisher failed: {0}")]
    Publisher(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Publishing {day} failed ({message}); already published: {}", format_days(.published))]
    DailyPublish {
        day: NaiveDate,
        published: Vec<NaiveDate>,
        message: String,
    },

    #[error("Weekly digest for {filing_date} failed: {message}")]
    DigestPublish {
        filing_date: NaiveDate,
        message: String,
    },
}

fn format_days(days: &[NaiveDate]) -> String {
    if days.is_empty() {
        return "none".to_string();
    }
    days.iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl RecapError {
    /// Returns true if re-running the same command may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            RecapError::Http(_)
            | RecapError::Summarizer(_)
            | RecapError::Publisher(_)
            | RecapError::DailyPublish { .. }
            | RecapError::DigestPublish { .. } => true,
            RecapError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            RecapError::MalformedExport(_) => {
                "Check that the archive contains a valid conversations.json."
            }
            RecapError::ArchiveNotFound(_) => {
                "Pass the export path explicitly or set DOWNLOADS_DIR."
            }
            RecapError::Archive(_) => "Re-download the export archive.",
            RecapError::Configuration(_) => "Check config.json and the environment (.env).",
            RecapError::Io(_) => "Check file permissions and disk space.",
            RecapError::Json(_) | RecapError::CorruptState { .. } => {
                "Inspect or restore the state files in the work directory."
            }
            RecapError::Http(_) => "Check your internet connection and try again.",
            RecapError::Summarizer(_) => "Check OPENAI_API_KEY and the model name, then retry.",
            RecapError::Publisher(_) | RecapError::Api { .. } => {
                "Check NOTION_TOKEN, DATABASE_ID and the integration's access to the database."
            }
            RecapError::DailyPublish { .. } => {
                "Retry the run; days listed as already published may appear twice."
            }
            RecapError::DigestPublish { .. } => "Retry the run; the digest state was not updated.",
        }
    }
}
