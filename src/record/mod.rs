//! Persisted data model: per-test details, run records and the bounded
//! historic collection.
//!
//! Field names follow the on-disk JSON layout (`camelCase`), so documents
//! written by earlier reporter versions load without conversion.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of runs kept in the historic collection unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 100;

// ---------------------------------------------------------------------------
// TestOutcome
// ---------------------------------------------------------------------------

/// Final status of one test case within a run.
///
/// `Flaky` is never reported by the execution engine; it is derived from a
/// pass that needed at least one retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
    TimedOut,
    Flaky,
}

impl TestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestOutcome::Passed => "passed",
            TestOutcome::Failed => "failed",
            TestOutcome::Skipped => "skipped",
            TestOutcome::TimedOut => "timedOut",
            TestOutcome::Flaky => "flaky",
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Per-test detail
// ---------------------------------------------------------------------------

/// Source position extracted from a stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Sanitised failure information for a failed or timed-out test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// First line of the error message, ANSI-free, at most 500 characters.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ErrorLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// File or blob attached to a test result by the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDetail {
    /// Cross-run key used by analytics. See `recorder::id::test_id`.
    pub id: String,
    pub title: String,
    /// Suite path down to the test, joined with `" > "`.
    pub full_title: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub project: String,
    pub status: TestOutcome,
    /// Milliseconds.
    pub duration: u64,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

// ---------------------------------------------------------------------------
// Run record
// ---------------------------------------------------------------------------

/// Outcome counts for one run. `total` always equals the sum of the other
/// counters and the number of tests in the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub flaky: u32,
    pub timed_out: u32,
}

impl RunSummary {
    /// Count the final statuses of a sequence of tests.
    pub fn from_tests(tests: &[TestDetail]) -> Self {
        let mut summary = RunSummary::default();
        for test in tests {
            summary.record(test.status);
        }
        summary
    }

    fn record(&mut self, outcome: TestOutcome) {
        self.total += 1;
        match outcome {
            TestOutcome::Passed => self.passed += 1,
            TestOutcome::Failed => self.failed += 1,
            TestOutcome::Skipped => self.skipped += 1,
            TestOutcome::TimedOut => self.timed_out += 1,
            TestOutcome::Flaky => self.flaky += 1,
        }
    }

    /// Count for a single outcome.
    pub fn count(&self, outcome: TestOutcome) -> u32 {
        match outcome {
            TestOutcome::Passed => self.passed,
            TestOutcome::Failed => self.failed,
            TestOutcome::Skipped => self.skipped,
            TestOutcome::TimedOut => self.timed_out,
            TestOutcome::Flaky => self.flaky,
        }
    }

    /// Share of tests that eventually passed (flaky included), in `[0, 1]`.
    /// `None` for an empty run.
    pub fn pass_ratio(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(f64::from(self.passed + self.flaky) / f64::from(self.total))
    }
}

/// Execution environment of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    /// Version of the test framework that produced the events.
    #[serde(alias = "playwright_version")]
    pub tool_version: String,
    /// Version of the runtime hosting the test framework.
    #[serde(alias = "node_version")]
    pub platform_version: String,
    pub os: String,
    /// Comma-separated execution profiles (browsers, devices) seen in the run.
    #[serde(alias = "browser")]
    pub browser_set: String,
    pub workers: u32,
    pub retries: u32,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            tool_version: "unknown".to_string(),
            platform_version: "unknown".to_string(),
            os: std::env::consts::OS.to_string(),
            browser_set: String::new(),
            workers: 1,
            retries: 0,
        }
    }
}

/// One finalized test run. Immutable once produced by the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: String,
    /// Instant the run ended.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Wall-clock milliseconds between run start and finalize.
    pub total_duration: u64,
    pub summary: RunSummary,
    pub tests: Vec<TestDetail>,
    #[serde(default)]
    pub metadata: RunMetadata,
}

impl RunRecord {
    /// Tests of the run with the given final status, in recorded order.
    pub fn tests_with_status(&self, outcome: TestOutcome) -> impl Iterator<Item = &TestDetail> {
        self.tests.iter().filter(move |t| t.status == outcome)
    }

    pub fn find_test(&self, test_id: &str) -> Option<&TestDetail> {
        self.tests.iter().find(|t| t.id == test_id)
    }
}

// ---------------------------------------------------------------------------
// Historic collection
// ---------------------------------------------------------------------------

/// Bounded run history, newest first.
///
/// Insertion always prepends and eviction always drops from the tail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricCollection {
    pub runs: Vec<RunRecord>,
}

impl HistoricCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `record` and keep at most `capacity` runs.
    pub fn push_front(&mut self, record: RunRecord, capacity: usize) {
        self.runs.insert(0, record);
        self.runs.truncate(capacity);
    }

    /// Most recently appended run.
    pub fn latest(&self) -> Option<&RunRecord> {
        self.runs.first()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Runs whose timestamp lies in `[now - window_days, now]`, newest first.
    pub fn within_window(
        &self,
        now: DateTime<Utc>,
        window_days: u32,
    ) -> impl Iterator<Item = &RunRecord> {
        // Windows reaching past the representable range cover all history.
        let cutoff = chrono::Duration::try_days(i64::from(window_days))
            .and_then(|span| now.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.runs
            .iter()
            .filter(move |run| run.timestamp >= cutoff && run.timestamp <= now)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
