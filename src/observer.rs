//! Run observer: the well-defined points at which a run reports progress
//!
//! The engine never logs progress through ambient state; it calls the
//! observer it was handed. [`LogObserver`] forwards everything to the `log`
//! facade and is what the binary uses.

use chrono::NaiveDate;

use crate::digest::DigestDecision;
use crate::error::RecapError;

/// Progress sink for a recap run. Every method defaults to a no-op.
pub trait RunObserver {
    fn batch_started(&self, _index: usize, _total: usize, _chars: usize) {}

    fn batch_finished(&self, _index: usize, _total: usize, _response_chars: usize) {}

    /// A summary section was discarded because its date could not be recovered.
    fn section_skipped(&self, _first_line: &str, _reason: &str) {}

    fn day_published(&self, _day: NaiveDate, _reference: &str) {}

    fn day_failed(&self, _day: NaiveDate, _error: &RecapError) {}

    fn checkpoint_committed(&self, _conversations: usize, _messages: usize) {}

    fn schedule_decided(&self, _decision: &DigestDecision) {}

    fn digest_published(&self, _filing_date: NaiveDate, _reference: &str) {}
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl RunObserver for NullObserver {}

/// Observer that writes through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn batch_started(&self, index: usize, total: usize, chars: usize) {
        log::info!("Summarizing batch {}/{} ({} chars)", index + 1, total, chars);
    }

    fn batch_finished(&self, index: usize, total: usize, response_chars: usize) {
        log::info!(
            "Batch {}/{} summarized ({} chars back)",
            index + 1,
            total,
            response_chars
        );
    }

    fn section_skipped(&self, first_line: &str, reason: &str) {
        log::warn!("Skipping summary section '{}': {}", first_line, reason);
    }

    fn day_published(&self, day: NaiveDate, reference: &str) {
        log::info!("Published {}: {}", day, reference);
    }

    fn day_failed(&self, day: NaiveDate, error: &RecapError) {
        log::error!("Publishing {} failed: {}", day, error);
    }

    fn checkpoint_committed(&self, conversations: usize, messages: usize) {
        log::info!(
            "Checkpoint updated ({} conversation(s), {} message(s))",
            conversations,
            messages
        );
    }

    fn schedule_decided(&self, decision: &DigestDecision) {
        log::info!("Weekly digest: {}", decision);
    }

    fn digest_published(&self, filing_date: NaiveDate, reference: &str) {
        log::info!("Weekly digest filed under {}: {}", filing_date, reference);
    }
}
