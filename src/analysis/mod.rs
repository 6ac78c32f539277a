//! Read-only analytics over the historic collection: flaky-rate ranking,
//! per-test trends and windowed summaries.
//!
//! Every query filters runs to the trailing window `[now - days, now]`.

pub mod flaky;
pub mod summary;
pub mod trend;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::record::{HistoricCollection, RunRecord};

pub use self::flaky::FlakyTest;
pub use self::summary::SummaryStats;
pub use self::trend::{TrendPoint, TrendStatus};

/// Queries against one loaded collection at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsEngine<'a> {
    history: &'a HistoricCollection,
    now: DateTime<Utc>,
}

impl<'a> AnalyticsEngine<'a> {
    pub fn new(history: &'a HistoricCollection) -> Self {
        Self::at(history, Utc::now())
    }

    /// Evaluate windows relative to `now` instead of the current time.
    pub fn at(history: &'a HistoricCollection, now: DateTime<Utc>) -> Self {
        Self { history, now }
    }

    fn window(&self, window_days: u32) -> Vec<&'a RunRecord> {
        let runs: Vec<&RunRecord> = self.history.within_window(self.now, window_days).collect();
        debug!(window_days, runs = runs.len(), "selected runs in window");
        runs
    }

    /// Tests that ended flaky at least once, highest rate first.
    pub fn flaky_tests(&self, window_days: u32) -> Vec<FlakyTest> {
        flaky::rank(self.window(window_days))
    }

    /// History of one test, oldest first. Runs lacking the test yield a
    /// `not-run` point.
    pub fn trend(&self, test_id: &str, window_days: u32) -> Vec<TrendPoint> {
        trend::points(self.window(window_days), test_id)
    }

    /// Aggregate statistics; `None` when no run falls in the window.
    pub fn summary(&self, window_days: u32) -> Option<SummaryStats> {
        let runs = self.window(window_days);
        let flaky_count = flaky::rank(runs.iter().copied()).len();
        summary::aggregate(&runs, flaky_count, window_days)
    }
}
