//! Publisher seam: one page per call
//!
//! The Notion adapter lives in `notion.rs`; [`DryRunPublisher`] only logs.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::error::RecapError;
use crate::render::Block;

/// Date property attached to a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateProperty {
    /// ISO 8601 date or local date-time.
    pub start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl DateProperty {
    /// Noon-to-one slot on `day`, expressed in the named time zone.
    pub fn midday(day: NaiveDate, time_zone: &str) -> Self {
        let at = |hour: u32| {
            let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default();
            day.and_time(time).format("%Y-%m-%dT%H:%M:%S").to_string()
        };
        Self {
            start: at(12),
            end: Some(at(13)),
            time_zone: Some(time_zone.to_string()),
        }
    }
}

/// Everything needed to create one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub title: String,
    pub date: Option<DateProperty>,
    pub blocks: Vec<Block>,
}

/// Reference to a created page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPage {
    pub id: String,
    pub url: Option<String>,
}

impl PublishedPage {
    /// URL when known, otherwise the id.
    pub fn reference(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.id)
    }
}

pub trait Publisher {
    fn publish(&self, page: &PageRequest) -> Result<PublishedPage, RecapError>;
}

/// Publishes nothing; logs what would have been created.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunPublisher;

impl Publisher for DryRunPublisher {
    fn publish(&self, page: &PageRequest) -> Result<PublishedPage, RecapError> {
        log::info!(
            "[dry-run] would create '{}' ({} blocks, date {})",
            page.title,
            page.blocks.len(),
            page.date
                .as_ref()
                .map_or("none", |d| d.start.as_str())
        );
        if log::log_enabled!(log::Level::Debug) {
            if let Ok(json) = serde_json::to_string_pretty(&page.blocks) {
                log::debug!("{}", json);
            }
        }
        Ok(PublishedPage {
            id: format!("dry-run:{}", page.title),
            url: None,
        })
    }
}
