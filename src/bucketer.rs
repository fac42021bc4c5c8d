//! Day bucketer: groups not-yet-processed messages into calendar-day text
//!
//! Buckets are rebuilt from scratch every run out of the events the
//! checkpoint still considers eligible, so a failed run re-derives exactly
//! the same days next time.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::checkpoint::{Checkpoint, RunProgress};
use crate::types::MessageEvent;
use crate::util::{local_date_of_timestamp, truncate_chars};

/// Appended to a day whose raw text exceeded the per-day cap.
pub const TRUNCATION_SUFFIX: &str = "\n…(truncated: too long)";

const LINE_SEPARATOR: &str = "\n- ";

/// Bucketing parameters for one run.
#[derive(Debug, Clone)]
pub struct DayBucketer {
    pub tz: Tz,
    /// Events dated strictly before this day are ignored entirely.
    pub floor: NaiveDate,
    pub max_day_chars: usize,
    /// Day assigned to events without a usable timestamp.
    pub today: NaiveDate,
}

/// Result of bucketing: day → text, plus what the run would commit.
#[derive(Debug, Default)]
pub struct DayBuckets {
    pub days: BTreeMap<NaiveDate, String>,
    pub progress: RunProgress,
    /// Eligible events dropped by the inception floor.
    pub floor_dropped: usize,
}

impl DayBuckets {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

impl DayBucketer {
    /// Calendar day of an event, or `None` when the floor excludes it.
    pub fn day_of(&self, event: &MessageEvent) -> Option<NaiveDate> {
        let Some(day) = event
            .timestamp
            .and_then(|ts| local_date_of_timestamp(ts, self.tz))
        else {
            return Some(self.today);
        };
        if day < self.floor {
            None
        } else {
            Some(day)
        }
    }

    /// Bucket every eligible event.
    pub fn bucket<I>(&self, events: I, checkpoint: &Checkpoint) -> DayBuckets
    where
        I: IntoIterator<Item = MessageEvent>,
    {
        let mut lines: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
        let mut progress = RunProgress::new();
        let mut floor_dropped = 0;

        for event in events {
            let event = self.with_usable_timestamp(event);
            if !checkpoint.is_eligible(&event) || progress.contains(&event) {
                continue;
            }
            let Some(day) = self.day_of(&event) else {
                floor_dropped += 1;
                continue;
            };
            lines.entry(day).or_default().push(format_line(&event));
            progress.record(&event, checkpoint.high_water_mark(&event.conversation_id));
        }

        if floor_dropped > 0 {
            log::debug!(
                "{} message(s) dated before {} left unprocessed",
                floor_dropped,
                self.floor
            );
        }

        let days = lines
            .into_iter()
            .map(|(day, lines)| (day, self.join_capped(&lines)))
            .collect();

        DayBuckets {
            days,
            progress,
            floor_dropped,
        }
    }

    /// Clear a timestamp that cannot be placed on a calendar. The event is
    /// then treated as undated: deduplicated by id and never moving the
    /// conversation's high-water mark.
    fn with_usable_timestamp(&self, mut event: MessageEvent) -> MessageEvent {
        if let Some(ts) = event.timestamp {
            if local_date_of_timestamp(ts, self.tz).is_none() {
                log::warn!(
                    "Unusable timestamp {} on message {} ({}), filing under today",
                    ts,
                    event.message_id,
                    event.conversation_id
                );
                event.timestamp = None;
            }
        }
        event
    }

    fn join_capped(&self, lines: &[String]) -> String {
        let joined = format!("{}{}", LINE_SEPARATOR, lines.join(LINE_SEPARATOR));
        if joined.chars().count() > self.max_day_chars {
            format!(
                "{}{}",
                truncate_chars(&joined, self.max_day_chars),
                TRUNCATION_SUFFIX
            )
        } else {
            joined
        }
    }
}

/// `[Role] title｜text`
fn format_line(event: &MessageEvent) -> String {
    format!(
        "[{}] {}｜{}",
        event.role.label(),
        event.conversation_title,
        event.text.trim()
    )
}
