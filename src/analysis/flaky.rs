//! Flaky-rate ranking.

use std::collections::HashMap;

use serde::Serialize;

use crate::record::{RunRecord, TestOutcome};

/// A test that ended `flaky` at least once in the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlakyTest {
    pub test_id: String,
    /// `occurrences / total`, in `(0, 1]`.
    pub flaky_rate: f64,
    /// Runs in which the test ended `flaky`.
    pub occurrences: u32,
    /// Runs in which the test appeared at all.
    pub total: u32,
}

#[derive(Default)]
struct Tally {
    flaky: u32,
    total: u32,
}

/// Rank tests by flaky rate, highest first. Tests that never ended flaky
/// are left out. Equal rates keep the order in which the tests were first
/// seen walking `runs`.
pub fn rank<'a>(runs: impl IntoIterator<Item = &'a RunRecord>) -> Vec<FlakyTest> {
    let mut order: Vec<&'a str> = Vec::new();
    let mut tallies: HashMap<&'a str, Tally> = HashMap::new();

    for run in runs {
        for test in &run.tests {
            let tally = tallies.entry(test.id.as_str()).or_insert_with(|| {
                order.push(test.id.as_str());
                Tally::default()
            });
            tally.total += 1;
            if test.status == TestOutcome::Flaky {
                tally.flaky += 1;
            }
        }
    }

    let mut ranked: Vec<FlakyTest> = order
        .into_iter()
        .filter_map(|id| {
            let tally = tallies.get(id)?;
            if tally.flaky == 0 {
                return None;
            }
            Some(FlakyTest {
                test_id: id.to_string(),
                flaky_rate: f64::from(tally.flaky) / f64::from(tally.total),
                occurrences: tally.flaky,
                total: tally.total,
            })
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| b.flaky_rate.total_cmp(&a.flaky_rate));
    ranked
}
