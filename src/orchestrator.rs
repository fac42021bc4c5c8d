//! Run orchestrator
//!
//! One run:
//! 1. Load the checkpoint and bucket every eligible message by day
//! 2. Summarize the buckets and publish one page per day, oldest first
//! 3. Commit the checkpoint only when every day was published
//! 4. Independently, publish the weekly digest when the schedule says so
//!
//! A failed publish stops the run before the checkpoint is touched, so the
//! next run re-derives the same days. Days published before the failure are
//! not rolled back.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde_json::Value;

use crate::bucketer::DayBucketer;
use crate::checkpoint::CheckpointStore;
use crate::digest::{self, DigestDecision, ScheduleStore, WeekWindow};
use crate::error::RecapError;
use crate::normalizer::conversation_events;
use crate::observer::RunObserver;
use crate::prompts;
use crate::publisher::{DateProperty, PageRequest, PublishedPage, Publisher};
use crate::render::{render_markdown, RenderOptions};
use crate::segmenter::{tidy_topic_spacing, BatchSegmenter};
use crate::summarizer::Summarizer;
use crate::types::Config;
use crate::util::format_day;

/// Summaries at or below this many characters count as empty.
const MIN_SUMMARY_CHARS: usize = 5;

/// Switches that change what a run is allowed to do.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Never write the checkpoint or the digest state.
    pub dry_run: bool,
    pub skip_weekly: bool,
}

/// The instant a run considers "now", fixed for the whole run.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    pub today: NaiveDate,
    pub now: DateTime<FixedOffset>,
}

impl RunClock {
    pub fn system(tz: chrono_tz::Tz) -> Self {
        let now = chrono::Utc::now().with_timezone(&tz);
        Self {
            today: now.date_naive(),
            now: now.fixed_offset(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DigestOutcome {
    Disabled,
    NotDue(DigestDecision),
    Published {
        filing_date: NaiveDate,
        window: WeekWindow,
        reference: String,
    },
}

/// What a run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Published days with the reference the publisher returned.
    pub published: Vec<(NaiveDate, String)>,
    pub checkpoint_committed: bool,
    pub messages_bucketed: usize,
    pub digest: DigestOutcome,
}

pub struct RunOrchestrator<'a> {
    config: &'a Config,
    summarizer: &'a dyn Summarizer,
    publisher: &'a dyn Publisher,
    observer: &'a dyn RunObserver,
    checkpoints: CheckpointStore,
    schedule: ScheduleStore,
    options: RunOptions,
    clock: RunClock,
}

impl<'a> RunOrchestrator<'a> {
    pub fn new(
        config: &'a Config,
        summarizer: &'a dyn Summarizer,
        publisher: &'a dyn Publisher,
        observer: &'a dyn RunObserver,
        options: RunOptions,
        clock: RunClock,
    ) -> Self {
        Self {
            config,
            summarizer,
            publisher,
            observer,
            checkpoints: CheckpointStore::new(config.checkpoint_path()),
            schedule: ScheduleStore::new(
                config.digest_state_path(),
                config.legacy_digest_state_path(),
            ),
            options,
            clock,
        }
    }

    /// Process one export. `conversations` comes from `load_conversations`.
    pub fn run(&self, conversations: &[Value]) -> Result<RunReport, RecapError> {
        let tz = self.config.tz()?;
        let checkpoint = self.checkpoints.load()?;

        let bucketer = DayBucketer {
            tz,
            floor: self.config.from_date,
            max_day_chars: self.config.max_day_chars,
            today: self.clock.today,
        };
        let buckets = bucketer.bucket(conversations.iter().flat_map(conversation_events), &checkpoint);
        let messages_bucketed = buckets.progress.message_count();

        let mut published = Vec::new();
        let mut checkpoint_committed = false;

        if buckets.is_empty() {
            log::info!("No new messages since the last run");
        } else {
            log::info!(
                "{} new message(s) across {} day(s)",
                messages_bucketed,
                buckets.days.len()
            );
            let summary = BatchSegmenter::new(
                self.summarizer,
                self.observer,
                self.config.max_request_chars,
            )
            .summarize(&buckets.days)?;

            for day in buckets.days.keys() {
                let markdown = daily_markdown(*day, summary.days.get(day).map(String::as_str));
                let page = self.daily_page(*day, &markdown);
                match self.publisher.publish(&page) {
                    Ok(page) => {
                        self.observer.day_published(*day, page.reference());
                        published.push((*day, page.reference().to_string()));
                    }
                    Err(e) => {
                        self.observer.day_failed(*day, &e);
                        return Err(RecapError::DailyPublish {
                            day: *day,
                            published: published.iter().map(|(d, _)| *d).collect(),
                            message: e.to_string(),
                        });
                    }
                }
            }

            if self.options.dry_run {
                log::info!("Dry run: checkpoint left untouched");
            } else {
                self.checkpoints.commit(&checkpoint, &buckets.progress)?;
                self.observer
                    .checkpoint_committed(buckets.progress.len(), messages_bucketed);
                checkpoint_committed = true;
            }
        }

        let digest = if self.options.skip_weekly {
            DigestOutcome::Disabled
        } else {
            self.run_digest(conversations, tz)?
        };

        Ok(RunReport {
            published,
            checkpoint_committed,
            messages_bucketed,
            digest,
        })
    }

    fn run_digest(
        &self,
        conversations: &[Value],
        tz: chrono_tz::Tz,
    ) -> Result<DigestOutcome, RecapError> {
        let state = self.schedule.load(self.clock.now)?;
        let max_chars = self
            .config
            .max_request_chars
            .saturating_sub(prompts::weekly_user_prompt_overhead());
        let decision = digest::decide(&state, self.clock.today, |window| {
            digest::build_weekly_log(conversations, window, tz, max_chars)
                .stats
                .conversation_count
                > 0
        });
        self.observer.schedule_decided(&decision);

        let (filing_date, window) = match decision {
            DigestDecision::Due {
                filing_date,
                window,
            } => (filing_date, window),
            other => return Ok(DigestOutcome::NotDue(other)),
        };

        let weekly = digest::build_weekly_log(conversations, &window, tz, max_chars);
        log::info!(
            "Weekly digest for {}: {} conversation(s), {:.1} min",
            window,
            weekly.stats.conversation_count,
            weekly.stats.total_duration_minutes
        );

        let report = self
            .summarizer
            .summarize(prompts::WEEKLY_SYSTEM_PROMPT, &prompts::weekly_user_prompt(&weekly.text))
            .map_err(|e| RecapError::DigestPublish {
                filing_date,
                message: e.to_string(),
            })?;
        let report = tidy_topic_spacing(report.trim());

        let page = PageRequest {
            title: format!("{} Weekly learning report", format_day(filing_date)),
            date: Some(DateProperty::midday(filing_date, &self.config.timezone)),
            blocks: render_markdown(&report, &self.render_options()),
        };
        let PublishedPage { id, url } =
            self.publisher
                .publish(&page)
                .map_err(|e| RecapError::DigestPublish {
                    filing_date,
                    message: e.to_string(),
                })?;
        let reference = url.unwrap_or(id);
        self.observer.digest_published(filing_date, &reference);

        if self.options.dry_run {
            log::info!("Dry run: weekly digest state left untouched");
        } else {
            self.schedule.commit(filing_date, self.clock.now)?;
        }

        Ok(DigestOutcome::Published {
            filing_date,
            window,
            reference,
        })
    }

    fn daily_page(&self, day: NaiveDate, markdown: &str) -> PageRequest {
        let dated = day + Duration::days(self.config.daily_date_offset_days);
        PageRequest {
            title: format!("{} ChatGPT recap", format_day(day)),
            date: Some(DateProperty::midday(dated, &self.config.timezone)),
            blocks: render_markdown(markdown, &self.render_options()),
        }
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            max_block_chars: self.config.max_block_chars,
            next_action_label: self.config.next_action_label.clone(),
        }
    }
}

/// Markdown for one day's page; a placeholder when the summary is missing
/// or effectively empty.
fn daily_markdown(day: NaiveDate, summary: Option<&str>) -> String {
    let day = format_day(day);
    match summary.map(str::trim) {
        Some(text) if text.chars().count() > MIN_SUMMARY_CHARS => format!("## {}\n{}", day, text),
        Some(_) => format!("## {}\n\nNo conversation content (summary was empty)", day),
        None => format!("## {}\n\nNo conversation content (no summary for this day)", day),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::observer::testing::RecordingObserver;
    use crate::render::Block;
    use crate::summarizer::PassthroughSummarizer;
    use chrono::TimeZone;
    use serde_json::json;
    use std::cell::RefCell;

    // 2025-09-26 10:00 JST and 2025-09-27 10:00 JST
    const SEP_26: f64 = 1_758_848_400.0;
    const SEP_27: f64 = 1_758_934_800.0;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn clock(today: NaiveDate) -> RunClock {
        let now = FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .from_local_datetime(&today.and_hms_opt(9, 0, 0).unwrap())
            .unwrap();
        RunClock { today, now }
    }

    fn config(dir: &std::path::Path) -> Config {
        Config {
            work_dir: dir.to_path_buf(),
            from_date: ymd(2025, 9, 18),
            ..Config::default()
        }
    }

    fn export() -> Vec<Value> {
        vec![json!({
            "id": "c1",
            "title": "Rust",
            "create_time": SEP_26,
            "messages": [
                { "id": "m1", "author": { "role": "user" }, "content": "lifetimes?", "create_time": SEP_26 },
                { "id": "m2", "author": { "role": "assistant" }, "content": "borrowck", "create_time": SEP_27 }
            ]
        })]
    }

    /// Records every page; fails on the titles it was told to reject.
    #[derive(Default)]
    struct FakePublisher {
        pages: RefCell<Vec<PageRequest>>,
        fail_titles: Vec<String>,
    }

    impl Publisher for FakePublisher {
        fn publish(&self, page: &PageRequest) -> Result<PublishedPage, RecapError> {
            if self.fail_titles.iter().any(|t| page.title.starts_with(t.as_str())) {
                return Err(RecapError::Api {
                    status: 400,
                    message: "validation_error".to_string(),
                });
            }
            self.pages.borrow_mut().push(page.clone());
            Ok(PublishedPage {
                id: format!("page-{}", self.pages.borrow().len()),
                url: None,
            })
        }
    }

    #[test]
    fn test_publishes_each_day_and_commits() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let publisher = FakePublisher::default();
        let observer = RecordingObserver::default();
        let options = RunOptions {
            skip_weekly: true,
            ..RunOptions::default()
        };
        let orchestrator = RunOrchestrator::new(
            &config,
            &PassthroughSummarizer,
            &publisher,
            &observer,
            options,
            clock(ymd(2025, 9, 30)),
        );

        let report = orchestrator.run(&export()).unwrap();
        assert_eq!(
            report.published.iter().map(|(d, _)| *d).collect::<Vec<_>>(),
            vec![ymd(2025, 9, 26), ymd(2025, 9, 27)]
        );
        assert!(report.checkpoint_committed);
        assert_eq!(report.digest, DigestOutcome::Disabled);

        let pages = publisher.pages.borrow();
        assert_eq!(pages[0].title, "2025-09-26 ChatGPT recap");
        assert_eq!(pages[0].date.as_ref().unwrap().start, "2025-09-29T12:00:00");
        assert_eq!(
            pages[0].blocks[0],
            Block::Heading {
                level: 2,
                spans: vec![crate::render::TextSpan::plain("2025-09-26")]
            }
        );
        let body = format!("{:?}", pages[0].blocks);
        assert!(body.contains("[User] Rust｜lifetimes?"));
        assert!(!body.contains("borrowck"));

        let checkpoint = CheckpointStore::new(config.checkpoint_path()).load().unwrap();
        assert!(checkpoint.has_seen("c1", "m2"));
        assert_eq!(checkpoint.high_water_mark("c1"), Some(SEP_27));
        assert!(observer
            .events()
            .contains(&"checkpoint_committed 1 2".to_string()));
    }

    #[test]
    fn test_second_run_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let publisher = FakePublisher::default();
        let observer = RecordingObserver::default();
        let options = RunOptions {
            skip_weekly: true,
            ..RunOptions::default()
        };
        let run = || {
            RunOrchestrator::new(
                &config,
                &PassthroughSummarizer,
                &publisher,
                &observer,
                options,
                clock(ymd(2025, 9, 30)),
            )
            .run(&export())
            .unwrap()
        };
        run();
        let second = run();
        assert!(second.published.is_empty());
        assert!(!second.checkpoint_committed);
        assert_eq!(publisher.pages.borrow().len(), 2);
    }

    #[test]
    fn test_failed_day_stops_run_without_commit() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let publisher = FakePublisher {
            fail_titles: vec!["2025-09-27".to_string()],
            ..FakePublisher::default()
        };
        let observer = RecordingObserver::default();
        let orchestrator = RunOrchestrator::new(
            &config,
            &PassthroughSummarizer,
            &publisher,
            &observer,
            RunOptions::default(),
            clock(ymd(2025, 9, 30)),
        );

        match orchestrator.run(&export()) {
            Err(RecapError::DailyPublish { day, published, .. }) => {
                assert_eq!(day, ymd(2025, 9, 27));
                assert_eq!(published, vec![ymd(2025, 9, 26)]);
            }
            other => panic!("expected a daily publish failure, got {:?}", other),
        }
        assert!(!config.checkpoint_path().exists());
        assert!(!config.digest_state_path().exists());
        assert!(observer
            .events()
            .contains(&"day_failed 2025-09-27".to_string()));
    }

    #[test]
    fn test_summarizer_failure_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let publisher = FakePublisher::default();
        let failing = |_: &str, _: &str| -> Result<String, RecapError> {
            Err(RecapError::Summarizer("timeout".to_string()))
        };
        let orchestrator = RunOrchestrator::new(
            &config,
            &failing,
            &publisher,
            &crate::observer::NullObserver,
            RunOptions::default(),
            clock(ymd(2025, 9, 30)),
        );
        assert!(matches!(
            orchestrator.run(&export()),
            Err(RecapError::Summarizer(_))
        ));
        assert!(publisher.pages.borrow().is_empty());
        assert!(!config.checkpoint_path().exists());
    }

    #[test]
    fn test_missing_summary_gets_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let publisher = FakePublisher::default();
        // Only ever talks about the 26th
        let partial = |_: &str, _: &str| -> Result<String, RecapError> {
            Ok("## 2025-09-26\n### Lifetimes\n**Field:** Rust".to_string())
        };
        let orchestrator = RunOrchestrator::new(
            &config,
            &partial,
            &publisher,
            &crate::observer::NullObserver,
            RunOptions {
                skip_weekly: true,
                ..RunOptions::default()
            },
            clock(ymd(2025, 9, 30)),
        );
        orchestrator.run(&export()).unwrap();

        let pages = publisher.pages.borrow();
        let second = format!("{:?}", pages[1].blocks);
        assert!(second.contains("No conversation content (no summary for this day)"));
        let first = format!("{:?}", pages[0].blocks);
        assert!(first.contains("Lifetimes"));
    }

    #[test]
    fn test_dry_run_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let publisher = FakePublisher::default();
        let orchestrator = RunOrchestrator::new(
            &config,
            &PassthroughSummarizer,
            &publisher,
            &crate::observer::NullObserver,
            RunOptions {
                dry_run: true,
                skip_weekly: false,
            },
            clock(ymd(2025, 10, 1)),
        );
        let report = orchestrator.run(&export()).unwrap();
        assert_eq!(report.published.len(), 2);
        assert!(!report.checkpoint_committed);
        assert!(matches!(report.digest, DigestOutcome::Published { .. }));
        assert!(!config.checkpoint_path().exists());
        assert!(!config.digest_state_path().exists());
    }

    #[test]
    fn test_first_weekly_digest_is_filed_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        // The daily part already ran for this export
        let mut progress = crate::checkpoint::RunProgress::new();
        for event in export().iter().flat_map(conversation_events) {
            progress.record(&event, None);
        }
        CheckpointStore::new(config.checkpoint_path())
            .commit(&Checkpoint::default(), &progress)
            .unwrap();

        let publisher = FakePublisher::default();
        let observer = RecordingObserver::default();
        // Wednesday 2025-10-01; the completed week 09-22..09-26 has data
        let orchestrator = RunOrchestrator::new(
            &config,
            &PassthroughSummarizer,
            &publisher,
            &observer,
            RunOptions::default(),
            clock(ymd(2025, 10, 1)),
        );
        let report = orchestrator.run(&export()).unwrap();

        assert!(report.published.is_empty());
        match &report.digest {
            DigestOutcome::Published { filing_date, .. } => {
                assert_eq!(*filing_date, ymd(2025, 10, 5))
            }
            other => panic!("expected a published digest, got {:?}", other),
        }
        let pages = publisher.pages.borrow();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title, "2025-10-05 Weekly learning report");
        assert_eq!(pages[0].date.as_ref().unwrap().start, "2025-10-05T12:00:00");

        let state = ScheduleStore::new(config.digest_state_path(), config.legacy_digest_state_path())
            .load(clock(ymd(2025, 10, 1)).now)
            .unwrap();
        assert_eq!(state.last_registration_date, Some(ymd(2025, 10, 5)));
        assert!(observer
            .events()
            .contains(&"digest_published 2025-10-05".to_string()));
    }

    #[test]
    fn test_weekly_failure_leaves_schedule_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::write(config.legacy_digest_state_path(), "2025-09-21").unwrap();
        let publisher = FakePublisher {
            fail_titles: vec!["2025-09-28 Weekly".to_string()],
            ..FakePublisher::default()
        };
        let orchestrator = RunOrchestrator::new(
            &config,
            &PassthroughSummarizer,
            &publisher,
            &crate::observer::NullObserver,
            RunOptions::default(),
            clock(ymd(2025, 9, 30)),
        );
        match orchestrator.run(&export()) {
            Err(RecapError::DigestPublish { filing_date, .. }) => {
                assert_eq!(filing_date, ymd(2025, 9, 28))
            }
            other => panic!("expected a digest failure, got {:?}", other),
        }
        // Daily pages went out and were committed before the digest failed
        assert!(config.checkpoint_path().exists());
        let state = ScheduleStore::new(config.digest_state_path(), config.legacy_digest_state_path())
            .load(clock(ymd(2025, 9, 30)).now)
            .unwrap();
        assert_eq!(state.last_registration_date, Some(ymd(2025, 9, 21)));
    }

    #[test]
    fn test_daily_markdown_placeholders() {
        let day = ymd(2025, 9, 26);
        assert_eq!(daily_markdown(day, Some("## x\nbody text")), "## 2025-09-26\n## x\nbody text");
        assert!(daily_markdown(day, Some("  ok  ")).contains("summary was empty"));
        assert!(daily_markdown(day, None).contains("no summary for this day"));
    }
}
