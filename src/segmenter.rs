//! Batch segmenter: day buckets → bounded summarizer requests → per-day summaries
//!
//! - All days are combined into one `## YYYY-MM-DD` document
//! - A document that fits in `max_request_chars` goes out as a single request
//! - Anything larger is cut at line boundaries into several requests
//! - Each response is split back into days on its `## YYYY-MM-DD` headers

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::RecapError;
use crate::observer::RunObserver;
use crate::prompts;
use crate::summarizer::Summarizer;
use crate::util::format_day;

const SPLIT_TITLE: &str = "## Multi-day recap (split)";

// Compile-once regex patterns via OnceLock.
fn re_day_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^## \d{4}-\d{2}-\d{2}").expect("day header regex should compile"))
}

fn re_part_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^## Part \d+\s*$").expect("part header regex should compile"))
}

fn re_before_topic() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([^\n])\n(###\s)").expect("topic spacing regex should compile"))
}

fn re_after_topic() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(###[^\n]+)\n([^\n])").expect("topic spacing regex should compile"))
}

/// Per-day summaries recovered from the summarizer's responses.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SegmentedSummary {
    pub days: BTreeMap<NaiveDate, String>,
    /// Every response, joined under `## Part N` headers when split.
    pub document: String,
    pub requests: usize,
    pub skipped_sections: usize,
}

/// A section that could not be attributed to a day.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSection {
    pub first_line: String,
    pub reason: String,
}

/// Result of splitting one response.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedSections {
    pub days: Vec<(NaiveDate, String)>,
    pub skipped: Vec<SkippedSection>,
}

pub struct BatchSegmenter<'a> {
    summarizer: &'a dyn Summarizer,
    observer: &'a dyn RunObserver,
    max_request_chars: usize,
}

impl<'a> BatchSegmenter<'a> {
    pub fn new(
        summarizer: &'a dyn Summarizer,
        observer: &'a dyn RunObserver,
        max_request_chars: usize,
    ) -> Self {
        Self {
            summarizer,
            observer,
            max_request_chars,
        }
    }

    /// Summarize every day bucket. Blank input makes no call at all.
    pub fn summarize(
        &self,
        days: &BTreeMap<NaiveDate, String>,
    ) -> Result<SegmentedSummary, RecapError> {
        let combined = combine_days(days);
        if combined.trim().is_empty() {
            return Ok(SegmentedSummary::default());
        }

        // The bound covers the whole user text, prompt prefix included.
        let budget = self
            .max_request_chars
            .saturating_sub(prompts::daily_user_prompt_overhead())
            .max(1);
        let chunks = if combined.chars().count() <= budget {
            vec![combined]
        } else {
            split_into_chunks(&combined, budget)
        };
        let total = chunks.len();
        if total > 1 {
            log::info!(
                "Combined log exceeds {} chars, splitting into {} requests",
                self.max_request_chars,
                total
            );
        }

        let mut out = SegmentedSummary {
            requests: total,
            ..SegmentedSummary::default()
        };
        let mut parts = Vec::with_capacity(total);

        for (index, chunk) in chunks.iter().enumerate() {
            self.observer
                .batch_started(index, total, chunk.chars().count());
            let response = self
                .summarizer
                .summarize(prompts::DAILY_SYSTEM_PROMPT, &prompts::daily_user_prompt(chunk))?;
            let response = tidy_topic_spacing(response.trim());
            self.observer
                .batch_finished(index, total, response.chars().count());

            let parsed = parse_daily_sections(&response);
            for skipped in &parsed.skipped {
                self.observer
                    .section_skipped(&skipped.first_line, &skipped.reason);
            }
            out.skipped_sections += parsed.skipped.len();
            for (day, content) in parsed.days {
                let entry = out.days.entry(day).or_default();
                if !content.is_empty() {
                    if !entry.is_empty() {
                        entry.push_str("\n\n");
                    }
                    entry.push_str(&content);
                }
            }
            parts.push(response);
        }

        out.document = if total == 1 {
            parts.remove(0)
        } else {
            let body = parts
                .iter()
                .enumerate()
                .map(|(i, md)| format!("## Part {}\n{}", i + 1, md))
                .collect::<Vec<_>>()
                .join("\n\n");
            format!("{}\n\n{}", SPLIT_TITLE, body)
        };
        Ok(out)
    }
}

/// `"\n## {day}\n{text}\n"` for each day, ascending.
pub fn combine_days(days: &BTreeMap<NaiveDate, String>) -> String {
    days.iter()
        .map(|(day, text)| format!("\n## {}\n{}\n", format_day(*day), text))
        .collect()
}

/// Cut `text` into chunks of at most `max_chars` characters, only ever
/// breaking between lines. A chunk that starts in the middle of a day
/// restates that day's header first. A single line longer than the bound
/// becomes its own chunk.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;
    let mut day_header: Option<&str> = None;

    for line in text.split('\n') {
        let is_header = re_day_header().is_match(line);
        let line_len = line.chars().count();
        if !current.is_empty() && current_len + 1 + line_len > max_chars {
            push_chunk(&mut chunks, &current);
            current.clear();
            current_len = 0;
        }
        if is_header {
            day_header = Some(line);
        }
        if current.is_empty() {
            if line.is_empty() {
                continue;
            }
            if let Some(header) = day_header.filter(|_| !is_header) {
                let header_len = header.chars().count();
                if header_len + 1 + line_len <= max_chars {
                    current.push(header);
                    current_len = header_len;
                }
            }
        }
        if current.is_empty() {
            if line_len > max_chars {
                log::warn!(
                    "A single log line of {} chars exceeds the request bound of {}",
                    line_len,
                    max_chars
                );
            }
            current_len = line_len;
        } else {
            current_len += 1 + line_len;
        }
        current.push(line);
    }
    push_chunk(&mut chunks, &current);
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, lines: &[&str]) {
    let chunk = lines.join("\n");
    let chunk = chunk.trim_matches('\n');
    if !chunk.trim().is_empty() {
        chunks.push(chunk.to_string());
    }
}

/// Split a summarizer response into `(day, summary)` pairs in order.
///
/// Text before the first day header cannot be attributed to a day and is
/// reported as skipped.
pub fn parse_daily_sections(response: &str) -> ParsedSections {
    let mut parsed = ParsedSections::default();

    let mut starts: Vec<usize> = re_day_header().find_iter(response).map(|m| m.start()).collect();
    if starts.is_empty() {
        if !response.trim().is_empty() {
            log::debug!("Summary has no day headers; nothing to attribute");
        }
        return parsed;
    }
    let preamble = response[..starts[0]].trim();
    if !preamble.is_empty() {
        parsed.skipped.push(SkippedSection {
            first_line: preamble.lines().next().unwrap_or_default().to_string(),
            reason: "text before the first day header".to_string(),
        });
    }
    starts.push(response.len());

    for bounds in starts.windows(2) {
        let section = &response[bounds[0]..bounds[1]];
        let mut lines = section.lines();
        let first_line = lines.next().unwrap_or_default();
        match header_date(first_line) {
            Ok(day) => {
                let content = lines
                    .filter(|l| !re_part_header().is_match(l) && l.trim() != SPLIT_TITLE)
                    .collect::<Vec<_>>()
                    .join("\n");
                parsed.days.push((day, content.trim().to_string()));
            }
            Err(reason) => parsed.skipped.push(SkippedSection {
                first_line: first_line.to_string(),
                reason,
            }),
        }
    }
    parsed
}

/// A `## ` header must hold nothing but the date. A bare line only needs to
/// start with one.
fn header_date(first_line: &str) -> Result<NaiveDate, String> {
    let candidate: String = match first_line.strip_prefix("## ") {
        Some(rest) => rest.trim().to_string(),
        None => first_line.trim_start().chars().take(10).collect(),
    };
    NaiveDate::parse_from_str(&candidate, "%Y-%m-%d")
        .map_err(|e| format!("'{}' is not a valid date: {}", candidate, e))
}

/// Put blank lines around `###` topic headings.
pub fn tidy_topic_spacing(markdown: &str) -> String {
    let spaced = re_before_topic().replace_all(markdown, "$1\n\n$2");
    re_after_topic()
        .replace_all(&spaced, "$1\n\n$2")
        .into_owned()
}
