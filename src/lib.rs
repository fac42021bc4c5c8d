//! Incremental daily recaps of a conversation export.
//!
//! Pipeline: export → [`normalizer`] → [`checkpoint`] filter → [`bucketer`]
//! → [`segmenter`] (summarizer) → [`render`] → [`publisher`], then a
//! checkpoint commit; the [`digest`] scheduler runs alongside for the weekly
//! report. [`orchestrator`] sequences one run.

pub mod archive;
pub mod bucketer;
pub mod checkpoint;
pub mod config;
pub mod digest;
pub mod error;
pub mod normalizer;
pub mod notion;
pub mod observer;
pub mod openai;
pub mod orchestrator;
pub mod prompts;
pub mod publisher;
pub mod render;
pub mod segmenter;
pub mod summarizer;
pub mod types;
pub mod util;
