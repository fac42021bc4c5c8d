//! dailyrecap: turn the latest conversation export into daily recap pages.
//!
//! Usage: `dailyrecap [ARCHIVE] [--workdir DIR] [--from-date YYYY-MM-DD]
//! [--timezone TZ] [--dry-run] [--skip-weekly]`

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;

use dailyrecap_lib::archive::{find_latest_archive, read_export};
use dailyrecap_lib::config::{downloads_dir, load_config, load_dotenv};
use dailyrecap_lib::error::RecapError;
use dailyrecap_lib::notion::NotionPublisher;
use dailyrecap_lib::observer::LogObserver;
use dailyrecap_lib::openai::OpenAiSummarizer;
use dailyrecap_lib::orchestrator::{DigestOutcome, RunClock, RunOptions, RunOrchestrator};
use dailyrecap_lib::publisher::{DryRunPublisher, Publisher};
use dailyrecap_lib::summarizer::{PassthroughSummarizer, Summarizer};
use dailyrecap_lib::types::Config;

/// Incremental daily recaps of a conversation export.
#[derive(Parser, Debug)]
#[command(name = "dailyrecap", version, about, long_about = None)]
struct Cli {
    /// Export archive (.zip) or conversations.json. Defaults to the newest
    /// zip in the downloads directory.
    archive: Option<PathBuf>,

    /// Directory holding config.json and the run state.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Ignore messages dated before this day (YYYY-MM-DD).
    #[arg(long)]
    from_date: Option<NaiveDate>,

    /// IANA timezone calendar days are computed in.
    #[arg(long)]
    timezone: Option<String>,

    /// Summarize and render, but publish nothing and commit nothing.
    #[arg(long)]
    dry_run: bool,

    /// Do not evaluate or publish the weekly digest.
    #[arg(long)]
    skip_weekly: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    load_dotenv();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("dailyrecap: {}", e);
            eprintln!("  {}", e.recovery_suggestion());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), RecapError> {
    let mut config = load_config(cli.workdir.as_deref())?;
    if let Some(from_date) = cli.from_date {
        config.from_date = from_date;
    }
    if let Some(timezone) = cli.timezone {
        config.timezone = timezone;
    }
    config.validate()?;
    std::fs::create_dir_all(&config.work_dir)?;
    let tz = config.tz()?;

    let archive = match cli.archive {
        Some(path) => path,
        None => {
            let dir = downloads_dir(&config).ok_or_else(|| {
                RecapError::Configuration("No downloads directory; pass the archive path".to_string())
            })?;
            find_latest_archive(&dir)?
        }
    };
    let conversations = read_export(&archive)?;

    let summarizer = build_summarizer(&config)?;
    let publisher = build_publisher(&config, cli.dry_run)?;
    let options = RunOptions {
        dry_run: cli.dry_run,
        skip_weekly: cli.skip_weekly,
    };

    let report = RunOrchestrator::new(
        &config,
        summarizer.as_ref(),
        publisher.as_ref(),
        &LogObserver,
        options,
        RunClock::system(tz),
    )
    .run(&conversations)?;

    log::info!(
        "Done: {} day(s) published, {} message(s) processed, checkpoint {}",
        report.published.len(),
        report.messages_bucketed,
        if report.checkpoint_committed { "updated" } else { "unchanged" }
    );
    match report.digest {
        DigestOutcome::Published { reference, .. } => log::info!("Weekly digest: {}", reference),
        DigestOutcome::NotDue(decision) => log::info!("Weekly digest: {}", decision),
        DigestOutcome::Disabled => {}
    }
    Ok(())
}

fn build_summarizer(config: &Config) -> Result<Box<dyn Summarizer>, RecapError> {
    match config.openai.api_key.as_deref() {
        Some(key) => {
            let summarizer = OpenAiSummarizer::new(key, &config.openai)?;
            log::info!("Summarizing with {}", summarizer.model());
            Ok(Box::new(summarizer))
        }
        None => {
            log::warn!("OPENAI_API_KEY is not set; pages will carry the raw log");
            Ok(Box::new(PassthroughSummarizer))
        }
    }
}

fn build_publisher(config: &Config, dry_run: bool) -> Result<Box<dyn Publisher>, RecapError> {
    if dry_run {
        return Ok(Box::new(DryRunPublisher));
    }
    match (config.notion.token.as_deref(), config.notion.database_id.as_deref()) {
        (Some(token), Some(database_id)) => {
            Ok(Box::new(NotionPublisher::connect(token, database_id)?))
        }
        _ => Err(RecapError::Configuration(
            "NOTION_TOKEN and DATABASE_ID must be set (or use --dry-run)".to_string(),
        )),
    }
}
