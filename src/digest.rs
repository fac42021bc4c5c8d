//! Weekly digest scheduler
//!
//! Decides whether a weekly digest is due today and which date it is filed
//! under. The schedule has three phases:
//! - NoPriorDigest: nothing filed yet; due as soon as a completed
//!   Monday–Friday window has data
//! - AwaitingNextWindow: a digest was filed; wait for the next Saturday
//! - DigestDue: filed under the Sunday after that Saturday
//!
//! State lives in `weekly_report_config.json` and is only rewritten after a
//! digest was published. An older plain-text `last_weekly_report.txt` is
//! migrated on first load.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bucketer::TRUNCATION_SUFFIX;
use crate::error::RecapError;
use crate::normalizer::{conversation_events, conversation_id, parse_timestamp};
use crate::types::Role;
use crate::util::{atomic_write_str, format_day, truncate_chars};

pub const DIGEST_STATE_VERSION: &str = "1.0";

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestScheduleState {
    /// Filing date of the last published digest.
    #[serde(rename = "last_weekly_report_date", default)]
    pub last_registration_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_at: Option<DateTime<FixedOffset>>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    DIGEST_STATE_VERSION.to_string()
}

impl Default for DigestScheduleState {
    fn default() -> Self {
        Self {
            last_registration_date: None,
            updated_at: None,
            migrated_at: None,
            version: default_version(),
        }
    }
}

/// File-backed schedule state with one-time legacy migration.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    path: PathBuf,
    legacy_path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>, legacy_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            legacy_path: legacy_path.into(),
        }
    }

    /// Load the schedule state. `now` stamps a legacy migration.
    pub fn load(&self, now: DateTime<FixedOffset>) -> Result<DigestScheduleState, RecapError> {
        if !self.path.exists() && self.legacy_path.exists() {
            if let Some(state) = self.migrate_legacy(now)? {
                return Ok(state);
            }
        }
        if !self.path.exists() {
            return Ok(DigestScheduleState::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| RecapError::CorruptState {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn migrate_legacy(
        &self,
        now: DateTime<FixedOffset>,
    ) -> Result<Option<DigestScheduleState>, RecapError> {
        let content = std::fs::read_to_string(&self.legacy_path)?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }
        let date = NaiveDate::parse_from_str(content, "%Y-%m-%d").map_err(|e| {
            RecapError::CorruptState {
                path: self.legacy_path.clone(),
                message: e.to_string(),
            }
        })?;

        let state = DigestScheduleState {
            last_registration_date: Some(date),
            updated_at: Some(now),
            migrated_at: Some(now),
            version: default_version(),
        };
        self.write(&state)?;
        log::info!(
            "Migrated {} to {}",
            self.legacy_path.display(),
            self.path.display()
        );
        Ok(Some(state))
    }

    /// Record a successfully published digest.
    pub fn commit(
        &self,
        filing_date: NaiveDate,
        now: DateTime<FixedOffset>,
    ) -> Result<DigestScheduleState, RecapError> {
        let state = DigestScheduleState {
            last_registration_date: Some(filing_date),
            updated_at: Some(now),
            migrated_at: None,
            version: default_version(),
        };
        self.write(&state)?;
        log::info!("Weekly digest state updated: last filed {}", filing_date);
        Ok(state)
    }

    fn write(&self, state: &DigestScheduleState) -> Result<(), RecapError> {
        let content = serde_json::to_string_pretty(state)?;
        atomic_write_str(&self.path, &content)?;
        Ok(())
    }
}

// =============================================================================
// Schedule
// =============================================================================

/// A Monday–Friday working week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    pub monday: NaiveDate,
    pub friday: NaiveDate,
}

impl WeekWindow {
    /// The Monday-based week that `day` falls in.
    pub fn containing(day: NaiveDate) -> Self {
        let monday = monday_of(day);
        Self {
            monday,
            friday: monday + Duration::days(4),
        }
    }

    /// The latest window whose Friday is on or before `today`.
    pub fn latest_completed(today: NaiveDate) -> Self {
        let this_week = Self::containing(today);
        if today < this_week.friday {
            this_week.previous()
        } else {
            this_week
        }
    }

    pub fn previous(&self) -> Self {
        Self {
            monday: self.monday - Duration::days(7),
            friday: self.friday - Duration::days(7),
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.monday <= day && day <= self.friday
    }
}

impl fmt::Display for WeekWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", format_day(self.monday), format_day(self.friday))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePhase {
    NoPriorDigest,
    AwaitingNextWindow,
    DigestDue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestDecision {
    Due {
        filing_date: NaiveDate,
        window: WeekWindow,
    },
    Awaiting {
        next_saturday: NaiveDate,
    },
    /// No prior digest and the latest completed week had no data.
    InsufficientData { window: WeekWindow },
    /// No prior digest and today is the Friday that would close the window.
    SkipCycle { today: NaiveDate },
}

impl DigestDecision {
    pub fn phase(&self) -> SchedulePhase {
        match self {
            DigestDecision::Due { .. } => SchedulePhase::DigestDue,
            DigestDecision::Awaiting { .. } => SchedulePhase::AwaitingNextWindow,
            DigestDecision::InsufficientData { .. } | DigestDecision::SkipCycle { .. } => {
                SchedulePhase::NoPriorDigest
            }
        }
    }

    pub fn is_due(&self) -> bool {
        matches!(self, DigestDecision::Due { .. })
    }
}

impl fmt::Display for DigestDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestDecision::Due {
                filing_date,
                window,
            } => write!(f, "due, filed under {} for {}", format_day(*filing_date), window),
            DigestDecision::Awaiting { next_saturday } => {
                write!(f, "not due until {}", format_day(*next_saturday))
            }
            DigestDecision::InsufficientData { window } => {
                write!(f, "no data for {}", window)
            }
            DigestDecision::SkipCycle { today } => {
                write!(f, "skipped on {} (window still open)", format_day(*today))
            }
        }
    }
}

fn monday_of(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

/// First Saturday strictly after `last`.
pub fn next_saturday(last: NaiveDate) -> NaiveDate {
    let saturday = monday_of(last) + Duration::days(5);
    if saturday <= last {
        saturday + Duration::days(7)
    } else {
        saturday
    }
}

/// Decide today's digest action.
///
/// `has_sufficient_data` is only consulted when no digest was filed yet.
pub fn decide<F>(state: &DigestScheduleState, today: NaiveDate, has_sufficient_data: F) -> DigestDecision
where
    F: FnOnce(&WeekWindow) -> bool,
{
    if let Some(last) = state.last_registration_date {
        let saturday = next_saturday(last);
        if today < saturday {
            return DigestDecision::Awaiting {
                next_saturday: saturday,
            };
        }
        return DigestDecision::Due {
            filing_date: saturday + Duration::days(1),
            window: WeekWindow::containing(saturday),
        };
    }

    let completed = WeekWindow::latest_completed(today);
    if !has_sufficient_data(&completed) {
        return DigestDecision::InsufficientData { window: completed };
    }
    let this_week = WeekWindow::containing(today);
    if today == this_week.friday {
        return DigestDecision::SkipCycle { today };
    }
    DigestDecision::Due {
        filing_date: this_week.friday + Duration::days(2),
        window: this_week,
    }
}

// =============================================================================
// Weekly log
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeeklyStats {
    pub conversation_count: usize,
    pub user_message_count: usize,
    pub assistant_message_count: usize,
    pub total_duration_minutes: f64,
}

/// Input text for the weekly digest plus the numbers it was built from.
#[derive(Debug, Clone, Default)]
pub struct WeeklyLog {
    pub text: String,
    pub stats: WeeklyStats,
}

/// Collect every conversation started inside `window` (local dates in `tz`).
///
/// A conversation without its own `create_time` is dated by its earliest
/// message. The text is capped at `max_chars` characters.
pub fn build_weekly_log(
    conversations: &[Value],
    window: &WeekWindow,
    tz: Tz,
    max_chars: usize,
) -> WeeklyLog {
    let mut stats = WeeklyStats::default();
    let mut sections = Vec::new();

    for record in conversations {
        let events: Vec<_> = conversation_events(record).collect();
        let timestamps: Vec<f64> = events.iter().filter_map(|e| e.timestamp).collect();
        let started = record
            .get("create_time")
            .and_then(parse_timestamp)
            .or_else(|| timestamps.iter().copied().reduce(f64::min));
        let Some(started) = started.and_then(|ts| local_datetime(ts, tz)) else {
            continue;
        };
        if !window.contains(started.date_naive()) {
            continue;
        }

        stats.conversation_count += 1;
        let mut section = format!(
            "=== Conversation {} ({}) ===\n",
            conversation_id(record),
            started.format("%Y-%m-%d %H:%M")
        );
        for event in &events {
            match event.role {
                Role::User => stats.user_message_count += 1,
                Role::Assistant => stats.assistant_message_count += 1,
                Role::Other(_) => continue,
            }
            section.push_str(&format!("[{}] {}\n", event.role.label(), event.text.trim()));
        }
        if timestamps.len() >= 2 {
            let first = timestamps.iter().copied().fold(f64::INFINITY, f64::min);
            let last = timestamps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            stats.total_duration_minutes += (last - first) / 60.0;
        }
        sections.push(section);
    }

    let mut text = format!(
        "=== Weekly conversation log ({} to {}) ===\n\n\
         Weekly statistics:\n\
         - Conversations: {}\n\
         - User messages: {}\n\
         - Assistant messages: {}\n\
         - Total conversation time: {:.1} min\n\n",
        format_day(window.monday),
        format_day(window.friday),
        stats.conversation_count,
        stats.user_message_count,
        stats.assistant_message_count,
        stats.total_duration_minutes
    );
    text.push_str(&sections.join("\n"));

    if text.chars().count() > max_chars {
        let keep = max_chars.saturating_sub(TRUNCATION_SUFFIX.chars().count());
        text = format!("{}{}", truncate_chars(&text, keep), TRUNCATION_SUFFIX);
    }
    WeeklyLog { text, stats }
}

fn local_datetime(ts: f64, tz: Tz) -> Option<DateTime<Tz>> {
    if !ts.is_finite() {
        return None;
    }
    DateTime::from_timestamp(ts.floor() as i64, 0).map(|utc| utc.with_timezone(&tz))
}
