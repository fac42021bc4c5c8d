//! Summarizer seam
//!
//! The engine only ever sees [`Summarizer`]; the OpenAI adapter lives in
//! `openai.rs`. Closures implement the trait too, which is what the tests use.

use crate::error::RecapError;

/// Turns a (system, user) prompt pair into markdown.
pub trait Summarizer {
    fn summarize(&self, system: &str, user: &str) -> Result<String, RecapError>;
}

impl<F> Summarizer for F
where
    F: Fn(&str, &str) -> Result<String, RecapError>,
{
    fn summarize(&self, system: &str, user: &str) -> Result<String, RecapError> {
        self(system, user)
    }
}

/// Used when no API key is configured: hands the raw log back so every day
/// still gets a document with its own messages in it. Any instruction text
/// ahead of the first `## ` header is left out.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSummarizer;

impl Summarizer for PassthroughSummarizer {
    fn summarize(&self, _system: &str, user: &str) -> Result<String, RecapError> {
        let start = if user.starts_with("## ") {
            0
        } else {
            user.find("\n## ").map_or(0, |i| i + 1)
        };
        Ok(user[start..].to_string())
    }
}
