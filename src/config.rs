//! Configuration loading
//!
//! Precedence, lowest first:
//! 1. Built-in defaults
//! 2. `<workDir>/config.json` (optional, camelCase)
//! 3. Environment variables, including a `.env` file in the current directory
//! 4. Command line flags (applied by the binary)

use std::path::{Path, PathBuf};

use crate::error::RecapError;
use crate::types::Config;

pub const CONFIG_FILE: &str = "config.json";

/// Load `.env` into the process environment if present.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => log::info!("Loaded environment variables from {}", path.display()),
        Err(e) if e.not_found() => log::debug!("No .env file, using the process environment"),
        Err(e) => log::warn!("Failed to load .env file: {}. Using the process environment.", e),
    }
}

/// Resolve the work directory and load the configuration stored in it.
///
/// `work_dir` (from the command line) wins over `WORK_DIR`.
pub fn load_config(work_dir: Option<&Path>) -> Result<Config, RecapError> {
    load_config_with(work_dir, |key| std::env::var(key).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with<F>(work_dir: Option<&Path>, lookup: F) -> Result<Config, RecapError>
where
    F: Fn(&str) -> Option<String>,
{
    let work_dir = match work_dir {
        Some(dir) => dir.to_path_buf(),
        None => match non_empty(&lookup, "WORK_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => Config::default().work_dir,
        },
    };

    let config_path = work_dir.join(CONFIG_FILE);
    let mut config: Config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        serde_json::from_str(&content).map_err(|e| {
            RecapError::Configuration(format!("Failed to parse {}: {}", config_path.display(), e))
        })?
    } else {
        log::debug!("No {} in {}, using defaults", CONFIG_FILE, work_dir.display());
        Config::default()
    };
    config.work_dir = work_dir;

    apply_env_overrides(&mut config, &lookup);
    Ok(config)
}

/// Apply environment overrides. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = non_empty(lookup, "OPENAI_API_KEY") {
        config.openai.api_key = Some(key);
    }
    if let Some(model) = non_empty(lookup, "OPENAI_MODEL") {
        config.openai.model = model;
    }
    if let Some(token) = non_empty(lookup, "NOTION_TOKEN") {
        config.notion.token = Some(token);
    }
    if let Some(id) = non_empty(lookup, "DATABASE_ID") {
        config.notion.database_id = Some(id);
    }
    if let Some(dir) = non_empty(lookup, "DOWNLOADS_DIR") {
        config.downloads_dir = Some(PathBuf::from(dir));
    }
    if let Some(tz) = non_empty(lookup, "RECAP_TIMEZONE") {
        config.timezone = tz;
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Directory searched for export archives.
pub fn downloads_dir(config: &Config) -> Option<PathBuf> {
    config.downloads_dir.clone().or_else(dirs::download_dir)
}
