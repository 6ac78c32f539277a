//! Windowed aggregate over runs.

use serde::Serialize;

use crate::record::RunRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub total_runs: usize,
    /// Mean run duration in milliseconds, rounded.
    pub avg_duration: u64,
    /// Mean per-run pass ratio as a whole percentage. `None` when every run
    /// in the window was empty.
    pub pass_rate: Option<u32>,
    pub flaky_test_count: usize,
    pub window_days: u32,
}

/// Aggregate `runs`; `None` when there are none.
pub fn aggregate(runs: &[&RunRecord], flaky_test_count: usize, window_days: u32) -> Option<SummaryStats> {
    if runs.is_empty() {
        return None;
    }

    let total_runs = runs.len();
    let duration_sum: f64 = runs.iter().map(|r| r.total_duration as f64).sum();
    let avg_duration = (duration_sum / total_runs as f64).round() as u64;

    // Runs without tests have no ratio and are left out of the mean.
    let ratios: Vec<f64> = runs.iter().filter_map(|r| r.summary.pass_ratio()).collect();
    let pass_rate = if ratios.is_empty() {
        None
    } else {
        let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
        Some((mean * 100.0).round() as u32)
    };

    Some(SummaryStats {
        total_runs,
        avg_duration,
        pass_rate,
        flaky_test_count,
        window_days,
    })
}
