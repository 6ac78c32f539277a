//! Per-test history across runs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::record::{RunRecord, TestOutcome};

/// Status of a test in one run, including not having run at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrendStatus {
    Passed,
    Failed,
    Skipped,
    TimedOut,
    Flaky,
    #[serde(rename = "not-run")]
    NotRun,
}

impl TrendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendStatus::Passed => "passed",
            TrendStatus::Failed => "failed",
            TrendStatus::Skipped => "skipped",
            TrendStatus::TimedOut => "timedOut",
            TrendStatus::Flaky => "flaky",
            TrendStatus::NotRun => "not-run",
        }
    }
}

impl From<TestOutcome> for TrendStatus {
    fn from(outcome: TestOutcome) -> Self {
        match outcome {
            TestOutcome::Passed => TrendStatus::Passed,
            TestOutcome::Failed => TrendStatus::Failed,
            TestOutcome::Skipped => TrendStatus::Skipped,
            TestOutcome::TimedOut => TrendStatus::TimedOut,
            TestOutcome::Flaky => TrendStatus::Flaky,
        }
    }
}

impl fmt::Display for TrendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub status: TrendStatus,
    /// Milliseconds; `0` when the test did not run.
    pub duration: u64,
    pub pr: Option<String>,
}

/// One point per run for `test_id`. `runs` is newest-first as stored; the
/// result is oldest-first.
pub fn points<'a>(runs: impl IntoIterator<Item = &'a RunRecord>, test_id: &str) -> Vec<TrendPoint> {
    let mut points: Vec<TrendPoint> = runs
        .into_iter()
        .map(|run| {
            let (status, duration) = match run.find_test(test_id) {
                Some(test) => (test.status.into(), test.duration),
                None => (TrendStatus::NotRun, 0),
            };
            TrendPoint {
                timestamp: run.timestamp,
                status,
                duration,
                pr: run.pr.clone(),
            }
        })
        .collect();
    points.reverse();
    points
}
