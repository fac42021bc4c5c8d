//! Document renderer: the markdown subset summaries are written in → [`Block`]s
//!
//! Supported:
//! - `#`, `##`, `###` headings (each followed by two spacer paragraphs)
//! - `**bold**` spans inside headings and paragraphs
//! - everything else is paragraph text, flushed whenever it grows past the
//!   block size limit

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

fn re_bold() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold regex should compile"))
}

/// A run of text with a single formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSpan {
    pub content: String,
    pub bold: bool,
}

impl TextSpan {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            bold: false,
        }
    }

    pub fn bold(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            bold: true,
        }
    }
}

/// Destination-neutral document block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, spans: Vec<TextSpan> },
    Paragraph { spans: Vec<TextSpan> },
    /// Empty paragraph used for vertical spacing.
    Spacer,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub max_block_chars: usize,
    pub next_action_label: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_block_chars: 1_900,
            next_action_label: "**Next action:**".to_string(),
        }
    }
}

/// Convert markdown into blocks. Never fails; unknown syntax is kept as text.
pub fn render_markdown(markdown: &str, options: &RenderOptions) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut pending = String::new();
    let mut pending_chars = 0usize;

    for line in markdown.split('\n') {
        if let Some((level, text)) = heading(line) {
            flush(&mut blocks, &mut pending, &mut pending_chars);
            if !text.is_empty() {
                blocks.push(Block::Heading {
                    level,
                    spans: parse_spans(text),
                });
                blocks.push(Block::Spacer);
                blocks.push(Block::Spacer);
            }
            continue;
        }

        let trimmed = line.trim();
        if !trimmed.is_empty() {
            pending.push_str(line);
            pending.push('\n');
            pending_chars += line.chars().count() + 1;
            if trimmed.starts_with(options.next_action_label.as_str()) {
                pending.push('\n');
                pending_chars += 1;
            }
        }
        if pending_chars > options.max_block_chars {
            flush(&mut blocks, &mut pending, &mut pending_chars);
        }
    }
    flush(&mut blocks, &mut pending, &mut pending_chars);
    blocks
}

/// `Some((level, text))` when the line's leading `#` run is 1 to 3 long.
fn heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    match hashes {
        1..=3 => Some((hashes as u8, line[hashes..].trim())),
        _ => None,
    }
}

fn flush(blocks: &mut Vec<Block>, pending: &mut String, pending_chars: &mut usize) {
    let text = pending.trim();
    if !text.is_empty() {
        blocks.push(Block::Paragraph {
            spans: parse_spans(text),
        });
    }
    pending.clear();
    *pending_chars = 0;
}

/// Split text into plain and bold spans on non-overlapping `**...**` pairs.
pub fn parse_spans(text: &str) -> Vec<TextSpan> {
    let mut spans = Vec::new();
    let mut current_pos = 0;

    for caps in re_bold().captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if inner.as_str().is_empty() {
            // `****` stays in the surrounding plain text
            continue;
        }
        if whole.start() > current_pos {
            spans.push(TextSpan::plain(&text[current_pos..whole.start()]));
        }
        spans.push(TextSpan::bold(inner.as_str()));
        current_pos = whole.end();
    }
    if current_pos < text.len() {
        spans.push(TextSpan::plain(&text[current_pos..]));
    }
    if spans.is_empty() {
        spans.push(TextSpan::plain(text));
    }
    spans
}
