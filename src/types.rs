use std::path::PathBuf;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::bucketer::TRUNCATION_SUFFIX;
use crate::error::RecapError;

/// Opaque, run-stable key of a conversation in the export.
pub type ConversationId = String;

/// Author role of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    Other(String),
}

impl Role {
    pub fn from_author(role: &str) -> Self {
        match role {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => Role::Other(other.to_string()),
        }
    }

    /// Label used when the message is written into a day bucket.
    pub fn label(&self) -> &str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Other(name) => name,
        }
    }
}

/// One message of one conversation, normalized from either export shape.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub conversation_id: ConversationId,
    pub role: Role,
    pub text: String,
    /// Seconds since the epoch. `None` means "now" for day assignment.
    pub timestamp: Option<f64>,
    pub message_id: String,
    pub conversation_title: String,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration stored in `<workDir>/config.json`.
///
/// Every field has a default so an absent or partial file is valid; secrets
/// normally arrive through the environment instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Where exports are auto-discovered when no archive path is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads_dir: Option<PathBuf>,
    /// IANA name of the timezone calendar days are computed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Inception floor: messages dated before this day are never processed.
    #[serde(default = "default_from_date")]
    pub from_date: NaiveDate,
    #[serde(default = "default_max_day_chars")]
    pub max_day_chars: usize,
    /// Upper bound for a single summarizer request.
    #[serde(default = "default_max_request_chars")]
    pub max_request_chars: usize,
    /// Paragraph flush threshold for rendered documents.
    #[serde(default = "default_max_block_chars")]
    pub max_block_chars: usize,
    #[serde(default = "default_next_action_label")]
    pub next_action_label: String,
    /// Daily pages are dated this many days after the day they describe.
    #[serde(default = "default_daily_date_offset_days")]
    pub daily_date_offset_days: i64,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub notion: NotionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            downloads_dir: None,
            timezone: default_timezone(),
            from_date: default_from_date(),
            max_day_chars: default_max_day_chars(),
            max_request_chars: default_max_request_chars(),
            max_block_chars: default_max_block_chars(),
            next_action_label: default_next_action_label(),
            daily_date_offset_days: default_daily_date_offset_days(),
            openai: OpenAiConfig::default(),
            notion: NotionConfig::default(),
        }
    }
}

impl Config {
    /// Parse the configured timezone.
    pub fn tz(&self) -> Result<Tz, RecapError> {
        self.timezone.parse::<Tz>().map_err(|_| {
            RecapError::Configuration(format!("Invalid timezone: {}", self.timezone))
        })
    }

    /// Reject limits the engine cannot honour.
    ///
    /// A capped day bucket (plus its day header) must always fit in one
    /// summarizer request, otherwise a single line could exceed the bound.
    pub fn validate(&self) -> Result<(), RecapError> {
        self.tz()?;
        if self.max_day_chars == 0 || self.max_request_chars == 0 || self.max_block_chars == 0 {
            return Err(RecapError::Configuration(
                "maxDayChars, maxRequestChars and maxBlockChars must be positive".to_string(),
            ));
        }
        // prompt prefix + "\n## YYYY-MM-DD\n" + bucket + suffix + "\n"
        let worst_case_day = crate::prompts::daily_user_prompt_overhead()
            + self.max_day_chars
            + TRUNCATION_SUFFIX.chars().count()
            + 16;
        if worst_case_day > self.max_request_chars {
            return Err(RecapError::Configuration(format!(
                "maxRequestChars ({}) must exceed a full day bucket ({})",
                self.max_request_chars, worst_case_day
            )));
        }
        Ok(())
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.work_dir.join("state.json")
    }

    pub fn digest_state_path(&self) -> PathBuf {
        self.work_dir.join("weekly_report_config.json")
    }

    pub fn legacy_digest_state_path(&self) -> PathBuf {
        self.work_dir.join("last_weekly_report.txt")
    }
}

/// Summarizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_openai_model(),
            base_url: default_openai_base_url(),
            temperature: default_temperature(),
        }
    }
}

/// Publisher settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionConfig {
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<String>,
}

fn default_work_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".dailyrecap")
}

fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}

fn default_from_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 18).unwrap_or_default()
}

fn default_max_day_chars() -> usize {
    16_000
}

fn default_max_request_chars() -> usize {
    120_000
}

fn default_max_block_chars() -> usize {
    1_900
}

fn default_next_action_label() -> String {
    "**Next action:**".to_string()
}

fn default_daily_date_offset_days() -> i64 {
    3
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_labels() {
        assert_eq!(Role::from_author("user").label(), "User");
        assert_eq!(Role::from_author("assistant").label(), "Assistant");
        assert_eq!(Role::from_author("tool").label(), "tool");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "timezone": "Europe/Berlin", "maxDayChars": 500 }"#)
                .unwrap();
        assert_eq!(config.timezone, "Europe/Berlin");
        assert_eq!(config.max_day_chars, 500);
        assert_eq!(config.max_request_chars, 120_000);
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_timezone() {
        let config = Config {
            timezone: "Mars/Olympus".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(RecapError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_request_smaller_than_day() {
        let config = Config {
            max_day_chars: 1_000,
            max_request_chars: 1_000,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = Config::default();
        config.openai.api_key = Some("sk-secret".to_string());
        config.notion.token = Some("secret_abc".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(!json.contains("secret_abc"));
    }
}
