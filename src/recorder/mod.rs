//! Run-metrics recorder: turns per-test completion events into one
//! finalized [`RunRecord`].
//!
//! Completion events may arrive from several workers at once, so the test
//! list sits behind a mutex and [`RunRecordBuilder::on_test_complete`] takes
//! `&self`. [`RunRecordBuilder::finalize`] consumes the builder, which means
//! every worker holding a reference must be gone before a record exists.

pub mod event;
pub mod id;
pub mod sanitize;

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::context::RunContext;
use crate::record::{RunMetadata, RunRecord, RunSummary, TestDetail, TestOutcome};

use self::event::{RawOutcome, RunStart, TestCompletion};

/// Separator between suite path segments in `TestDetail::full_title`.
pub const TITLE_SEPARATOR: &str = " > ";

/// Project name used when the engine does not report one.
pub const DEFAULT_PROJECT: &str = "default";

/// Final status for a raw outcome: a pass that needed a retry is flaky.
pub fn classify(outcome: &RawOutcome, retries: u32) -> TestOutcome {
    match outcome {
        RawOutcome::Passed if retries > 0 => TestOutcome::Flaky,
        RawOutcome::Passed => TestOutcome::Passed,
        RawOutcome::Failed { .. } => TestOutcome::Failed,
        RawOutcome::Skipped => TestOutcome::Skipped,
        RawOutcome::TimedOut { .. } => TestOutcome::TimedOut,
    }
}

/// Convert one completion event into the stored per-test detail.
pub fn test_detail(event: TestCompletion) -> TestDetail {
    let id = match event.stable_id.as_deref().map(str::trim) {
        Some(stable) if !stable.is_empty() => stable.to_string(),
        _ => id::test_id(&event.file, &event.title),
    };

    let full_title = if event.title_path.is_empty() {
        event.title.clone()
    } else {
        event.title_path.join(TITLE_SEPARATOR)
    };

    let status = classify(&event.outcome, event.retry);
    let error = sanitize::error_detail(event.outcome.errors());

    TestDetail {
        id,
        title: event.title,
        full_title,
        file: event.file,
        line: event.line,
        project: event.project.unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
        status,
        duration: event.duration,
        retries: event.retry,
        error,
        attachments: event.attachments,
    }
}

/// Accumulates the tests of one run.
#[derive(Debug)]
pub struct RunRecordBuilder {
    run_id: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    settings: RunStart,
    tests: Mutex<Vec<TestDetail>>,
}

impl RunRecordBuilder {
    /// Begin a run: note the start instant and allocate a fresh run id.
    pub fn start(settings: RunStart) -> Self {
        let started_at = Utc::now();
        let run_id = id::run_id(started_at);
        info!(%run_id, "starting test run");
        Self {
            run_id,
            started_at,
            clock: Instant::now(),
            settings,
            tests: Mutex::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record one completed test. Safe to call from many workers at once.
    pub fn on_test_complete(&self, event: TestCompletion) -> TestOutcome {
        let detail = test_detail(event);
        let status = detail.status;
        debug!(run_id = %self.run_id, test = %detail.id, %status, "test completed");

        self.tests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(detail);
        status
    }

    /// Number of tests recorded so far.
    pub fn test_count(&self) -> usize {
        self.tests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Close the run and produce its immutable record.
    pub fn finalize(self, context: &RunContext) -> RunRecord {
        let total_duration = u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        let tests = self.tests.into_inner().unwrap_or_else(PoisonError::into_inner);
        let summary = RunSummary::from_tests(&tests);

        let browser_set = tests
            .iter()
            .map(|t| t.project.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join(",");

        let defaults = RunMetadata::default();
        let metadata = RunMetadata {
            tool_version: self.settings.tool_version.unwrap_or(defaults.tool_version),
            platform_version: self
                .settings
                .platform_version
                .unwrap_or(defaults.platform_version),
            os: defaults.os,
            browser_set,
            workers: self.settings.workers.unwrap_or(defaults.workers),
            retries: self.settings.retries.unwrap_or(defaults.retries),
        };

        info!(
            run_id = %self.run_id,
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            flaky = summary.flaky,
            duration_ms = total_duration,
            "test run finalized"
        );

        RunRecord {
            id: self.run_id,
            timestamp: Utc::now(),
            pr: context.pr.clone(),
            branch: context.branch.clone(),
            commit: context.commit.clone(),
            environment: context.environment.clone(),
            total_duration,
            summary,
            tests,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::event::RawError;
    use super::*;

    fn passed(title: &str) -> TestCompletion {
        TestCompletion::new(title, "tests/sample.spec.ts", RawOutcome::Passed)
    }

    fn failed(title: &str, message: &str, stack: &str) -> TestCompletion {
        TestCompletion::new(
            title,
            "tests/sample.spec.ts",
            RawOutcome::Failed {
                errors: vec![RawError {
                    message: Some(message.to_string()),
                    stack: Some(stack.to_string()),
                }],
            },
        )
    }

    #[test]
    fn test_mixed_run_summary() {
        let builder = RunRecordBuilder::start(RunStart::default());
        for i in 0..8 {
            builder.on_test_complete(passed(&format!("stable {}", i)));
        }
        builder.on_test_complete(passed("wobbly").with_retry(1));
        builder.on_test_complete(failed("broken", "boom", ""));

        let record = builder.finalize(&RunContext::default());
        assert_eq!(
            record.summary,
            RunSummary {
                total: 10,
                passed: 8,
                failed: 1,
                skipped: 0,
                flaky: 1,
                timed_out: 0,
            }
        );
        assert_eq!(record.summary.total as usize, record.tests.len());
    }

    #[test]
    fn test_retried_pass_is_flaky() {
        assert_eq!(classify(&RawOutcome::Passed, 0), TestOutcome::Passed);
        assert_eq!(classify(&RawOutcome::Passed, 1), TestOutcome::Flaky);
        assert_eq!(classify(&RawOutcome::Passed, 3), TestOutcome::Flaky);
        assert_eq!(classify(&RawOutcome::Skipped, 2), TestOutcome::Skipped);
        assert_eq!(
            classify(&RawOutcome::Failed { errors: vec![] }, 2),
            TestOutcome::Failed
        );
    }

    #[test]
    fn test_error_only_on_failing_outcomes() {
        let detail = test_detail(failed(
            "broken",
            "\u{1b}[31mboom\u{1b}[0m\nmore",
            "Error: boom\n    at t (/repo/tests/sample.spec.ts:5:3)",
        ));
        let error = detail.error.unwrap();
        assert_eq!(error.message, "boom");
        assert_eq!(error.location.unwrap().line, 5);

        let timed_out = test_detail(TestCompletion::new(
            "slow",
            "tests/sample.spec.ts",
            RawOutcome::TimedOut { errors: vec![RawError::default()] },
        ));
        assert_eq!(timed_out.error.unwrap().message, "Unknown error");

        assert!(test_detail(passed("fine")).error.is_none());
    }

    #[test]
    fn test_detail_fields() {
        let detail = test_detail(
            passed("adds todo")
                .with_title_path(vec!["todos".into(), "crud".into(), "adds todo".into()])
                .with_duration(250),
        );
        assert_eq!(detail.id, "sample-adds-todo");
        assert_eq!(detail.full_title, "todos > crud > adds todo");
        assert_eq!(detail.project, DEFAULT_PROJECT);
        assert_eq!(detail.duration, 250);

        let mut stable = passed("adds todo");
        stable.stable_id = Some("todos::crud::adds_todo".into());
        assert_eq!(test_detail(stable).id, "todos::crud::adds_todo");
    }

    #[test]
    fn test_finalize_without_tests() {
        let builder = RunRecordBuilder::start(RunStart::default());
        let run_id = builder.run_id().to_string();
        let started_at = builder.started_at();
        let record = builder.finalize(&RunContext::default());
        assert_eq!(record.id, run_id);
        assert_eq!(record.summary.total, 0);
        assert!(record.tests.is_empty());
        assert!(record.timestamp >= started_at);
    }

    #[test]
    fn test_metadata_and_context_carried() {
        let builder = RunRecordBuilder::start(RunStart {
            tool_version: Some("1.44.0".into()),
            platform_version: None,
            workers: Some(4),
            retries: Some(2),
        });
        builder.on_test_complete(passed("a").with_project("webkit"));
        builder.on_test_complete(passed("b").with_project("chromium"));
        builder.on_test_complete(passed("c").with_project("webkit"));

        let context = RunContext {
            pr: Some("42".into()),
            branch: Some("feature/x".into()),
            commit: None,
            environment: Some("ci".into()),
        };
        let record = builder.finalize(&context);
        assert_eq!(record.metadata.tool_version, "1.44.0");
        assert_eq!(record.metadata.platform_version, "unknown");
        assert_eq!(record.metadata.browser_set, "chromium,webkit");
        assert_eq!(record.metadata.workers, 4);
        assert_eq!(record.metadata.retries, 2);
        assert_eq!(record.pr.as_deref(), Some("42"));
        assert!(record.commit.is_none());
    }

    #[test]
    fn test_concurrent_workers() {
        let builder = RunRecordBuilder::start(RunStart::default());
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let builder = &builder;
                scope.spawn(move || {
                    for i in 0..25 {
                        let title = format!("w{} t{}", worker, i);
                        let event = if i % 5 == 0 {
                            passed(&title).with_retry(1)
                        } else {
                            passed(&title)
                        };
                        builder.on_test_complete(event);
                    }
                });
            }
        });
        assert_eq!(builder.test_count(), 200);

        let record = builder.finalize(&RunContext::default());
        assert_eq!(record.summary.total, 200);
        assert_eq!(record.summary.flaky, 40);
        assert_eq!(record.summary.passed, 160);
    }
}
