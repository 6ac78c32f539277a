//! Human-readable rendering of runs and analytics for the terminal.
//!
//! Every function returns the full text; printing is left to the caller.

use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};

use crate::analysis::{FlakyTest, SummaryStats, TrendPoint};
use crate::record::{RunRecord, TestOutcome};
use crate::reporter::ReportOutcome;

const NOT_AVAILABLE: &str = "N/A";

/// Whole-number share of `count` in `total`; 0 for an empty total.
pub fn percent(count: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(count) * 100.0 / f64::from(total)).round() as u32
}

/// Milliseconds as rounded whole seconds, e.g. `"42s"`.
pub fn seconds(duration_ms: u64) -> String {
    format!("{}s", (duration_ms as f64 / 1000.0).round() as u64)
}

fn local_time(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn heading(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{}", title);
    let _ = writeln!(out, "{}", "=".repeat(title.chars().count()));
}

/// Full report of one run: header, counts, failures and flaky tests.
pub fn render_latest(run: &RunRecord) -> String {
    let mut out = String::new();
    heading(&mut out, "🎯 Latest Test Run Report");
    let _ = writeln!(out, "Run ID: {}", run.id);
    let _ = writeln!(out, "Timestamp: {}", local_time(run.timestamp));
    let _ = writeln!(out, "Branch: {}", run.branch.as_deref().unwrap_or(NOT_AVAILABLE));
    let _ = writeln!(out, "Commit: {}", run.commit.as_deref().unwrap_or(NOT_AVAILABLE));
    let _ = writeln!(out, "PR: {}", run.pr.as_deref().unwrap_or(NOT_AVAILABLE));
    let _ = writeln!(out, "Duration: {}", seconds(run.total_duration));
    let _ = writeln!(
        out,
        "Environment: {}",
        run.environment.as_deref().unwrap_or(NOT_AVAILABLE)
    );

    let s = &run.summary;
    let _ = writeln!(out, "\n📊 Summary:");
    let _ = writeln!(out, "  Total: {}", s.total);
    for (label, outcome) in [
        ("Passed", TestOutcome::Passed),
        ("Failed", TestOutcome::Failed),
        ("Flaky", TestOutcome::Flaky),
        ("Timed Out", TestOutcome::TimedOut),
        ("Skipped", TestOutcome::Skipped),
    ] {
        let count = s.count(outcome);
        let _ = writeln!(out, "  {}: {} ({}%)", label, count, percent(count, s.total));
    }

    for (title, outcome) in [
        ("❌ Failed Tests:", TestOutcome::Failed),
        ("⏱️  Timed Out Tests:", TestOutcome::TimedOut),
    ] {
        if s.count(outcome) == 0 {
            continue;
        }
        let _ = writeln!(out, "\n{}", title);
        for test in run.tests_with_status(outcome) {
            let _ = writeln!(out, "  • {}", test.full_title);
            if let Some(error) = &test.error {
                if !error.message.is_empty() {
                    let _ = writeln!(out, "    Error: {}", error.message);
                }
                if let Some(loc) = &error.location {
                    let _ = writeln!(out, "    Location: {}:{}", loc.file, loc.line);
                }
            }
        }
    }

    if s.flaky > 0 {
        let _ = writeln!(out, "\n⚠️  Flaky Tests:");
        for test in run.tests_with_status(TestOutcome::Flaky) {
            let _ = writeln!(out, "  • {} ({} retries)", test.full_title, test.retries);
        }
    }

    out
}

pub fn render_summary(stats: Option<&SummaryStats>, window_days: u32) -> String {
    let Some(stats) = stats else {
        return format!("No data available for the last {} days\n", window_days);
    };

    let mut out = String::new();
    heading(&mut out, &format!("📈 {}-Day Summary", stats.window_days));
    let _ = writeln!(out, "Total Runs: {}", stats.total_runs);
    let _ = writeln!(out, "Average Duration: {}", seconds(stats.avg_duration));
    match stats.pass_rate {
        Some(rate) => {
            let _ = writeln!(out, "Pass Rate: {}%", rate);
        }
        None => {
            let _ = writeln!(out, "Pass Rate: n/a");
        }
    }
    let _ = writeln!(out, "Flaky Tests: {}", stats.flaky_test_count);
    out
}

/// Top `limit` flaky tests with rounded rate and flaky occurrence count.
pub fn render_flaky(tests: &[FlakyTest], window_days: u32, limit: usize) -> String {
    let mut out = String::new();
    heading(&mut out, &format!("🔄 Most Flaky Tests ({} days)", window_days));

    if tests.is_empty() {
        out.push_str("No flaky tests found! 🎉\n");
        return out;
    }

    for (index, test) in tests.iter().take(limit).enumerate() {
        let _ = writeln!(out, "{}. {}", index + 1, test.test_id);
        let _ = writeln!(
            out,
            "   Flaky Rate: {}% ({} of {} runs)",
            (test.flaky_rate * 100.0).round() as u32,
            test.occurrences,
            test.total
        );
    }
    out
}

/// Oldest-first table of one test's history.
pub fn render_trend(test_id: &str, points: &[TrendPoint], window_days: u32) -> String {
    let mut out = String::new();
    heading(&mut out, &format!("📉 Trend for {} ({} days)", test_id, window_days));

    if points.is_empty() {
        let _ = writeln!(out, "No runs in the last {} days", window_days);
        return out;
    }

    let _ = writeln!(out, "{:<19} | {:<8} | {:>9} | PR", "Timestamp", "Status", "Duration");
    let _ = writeln!(out, "{:-<19}-|-{:-<8}-|-{:->9}-|-{:-<6}", "", "", "", "");
    for point in points {
        let _ = writeln!(
            out,
            "{:<19} | {:<8} | {:>7}ms | {}",
            local_time(point.timestamp),
            point.status.as_str(),
            point.duration,
            point.pr.as_deref().unwrap_or("-")
        );
    }
    out
}

/// Result of recording one ingested run.
pub fn render_ingest(outcome: &ReportOutcome) -> String {
    let s = &outcome.record.summary;
    let mut out = format!(
        "Recorded {}: {} tests ({} passed, {} failed, {} flaky, {} timed out, {} skipped) in {}\n",
        outcome.record.id,
        s.total,
        s.passed,
        s.failed,
        s.flaky,
        s.timed_out,
        s.skipped,
        seconds(outcome.record.total_duration),
    );

    if !outcome.persisted {
        out.push_str("Recording disabled, nothing written\n");
        return out;
    }
    match &outcome.standalone {
        Ok(path) => {
            let _ = writeln!(out, "✅ Run report: {}", path.display());
        }
        Err(e) => {
            let _ = writeln!(out, "❌ Run report not written: {}", e);
        }
    }
    match &outcome.history {
        Ok(len) => {
            let _ = writeln!(out, "✅ History updated ({} runs kept)", len);
        }
        Err(e) => {
            let _ = writeln!(out, "❌ History not updated: {}", e);
        }
    }
    out
}

pub fn usage() -> String {
    let mut out = String::new();
    heading(&mut out, "📊 Test Reports Viewer");
    out.push_str(
        "Usage: testledger [command]

Commands:
  latest            View the latest test run report
  summary           View 7-day summary statistics
  flaky             View most flaky tests (14 days)
  trend <test-id>   View one test's history (30 days)
  ingest <file|->   Record a JSON-lines event stream as one run

Examples:
  testledger latest
  testledger summary
  testledger flaky
  testledger trend auth-login-works
  testledger ingest events.jsonl
",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TrendStatus;
    use crate::record::fixtures::{detail, run};
    use crate::record::{ErrorDetail, ErrorLocation};
    use crate::storage::StoreError;

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(5, 0), 0);
    }

    #[test]
    fn test_render_latest() {
        let mut failed = detail("login", TestOutcome::Failed);
        failed.full_title = "auth > login".into();
        failed.error = Some(ErrorDetail {
            message: "expected 200".into(),
            location: Some(ErrorLocation {
                file: "tests/auth.spec.ts".into(),
                line: 14,
                column: 7,
            }),
            stack: None,
        });
        let mut flaky = detail("cart", TestOutcome::Flaky);
        flaky.full_title = "shop > cart".into();
        flaky.retries = 2;

        let mut record = run(
            "run-xyz",
            Utc::now(),
            vec![
                detail("a", TestOutcome::Passed),
                detail("b", TestOutcome::Passed),
                failed,
                flaky,
            ],
        );
        record.total_duration = 61_400;

        let text = render_latest(&record);
        assert!(text.contains("Run ID: run-xyz"));
        assert!(text.contains("Branch: main"));
        assert!(text.contains("PR: N/A"));
        assert!(text.contains("Duration: 61s"));
        assert!(text.contains("Passed: 2 (50%)"));
        assert!(text.contains("Failed: 1 (25%)"));
        assert!(text.contains("  • auth > login"));
        assert!(text.contains("Error: expected 200"));
        assert!(text.contains("Location: tests/auth.spec.ts:14"));
        assert!(text.contains("  • shop > cart (2 retries)"));
        assert!(!text.contains("Timed Out Tests"));
    }

    #[test]
    fn test_render_latest_empty_run() {
        let text = render_latest(&run("run-empty", Utc::now(), vec![]));
        assert!(text.contains("Total: 0"));
        assert!(text.contains("Passed: 0 (0%)"));
    }

    #[test]
    fn test_render_summary() {
        assert_eq!(
            render_summary(None, 7),
            "No data available for the last 7 days\n"
        );
        let stats = SummaryStats {
            total_runs: 4,
            avg_duration: 92_600,
            pass_rate: Some(88),
            flaky_test_count: 3,
            window_days: 7,
        };
        let text = render_summary(Some(&stats), 7);
        assert!(text.contains("7-Day Summary"));
        assert!(text.contains("Total Runs: 4"));
        assert!(text.contains("Average Duration: 93s"));
        assert!(text.contains("Pass Rate: 88%"));
        assert!(text.contains("Flaky Tests: 3"));

        let no_rate = SummaryStats {
            pass_rate: None,
            ..stats
        };
        assert!(render_summary(Some(&no_rate), 7).contains("Pass Rate: n/a"));
    }

    #[test]
    fn test_render_flaky_limits_entries() {
        assert!(render_flaky(&[], 14, 10).contains("No flaky tests found!"));

        let tests: Vec<FlakyTest> = (0..12)
            .map(|i| FlakyTest {
                test_id: format!("t{}", i),
                flaky_rate: 2.0 / 3.0,
                occurrences: 2,
                total: 3,
            })
            .collect();
        let text = render_flaky(&tests, 14, 10);
        assert!(text.contains("1. t0"));
        assert!(text.contains("10. t9"));
        assert!(!text.contains("11. t10"));
        assert!(text.contains("Flaky Rate: 67% (2 of 3 runs)"));
    }

    #[test]
    fn test_render_trend() {
        let points = vec![
            TrendPoint {
                timestamp: Utc::now(),
                status: TrendStatus::NotRun,
                duration: 0,
                pr: None,
            },
            TrendPoint {
                timestamp: Utc::now(),
                status: TrendStatus::Flaky,
                duration: 1_250,
                pr: Some("31".into()),
            },
        ];
        let text = render_trend("auth-login", &points, 30);
        assert!(text.contains("Trend for auth-login (30 days)"));
        assert!(text.contains("not-run"));
        assert!(text.contains("1250ms | 31"));
        assert!(render_trend("x", &[], 30).contains("No runs in the last 30 days"));
    }

    #[test]
    fn test_render_ingest_reports_each_write() {
        let outcome = ReportOutcome {
            record: run("run-1", Utc::now(), vec![detail("a", TestOutcome::Passed)]),
            persisted: true,
            standalone: Ok("reports/run-1.json".into()),
            history: Err(StoreError::WriterClosed),
        };
        let text = render_ingest(&outcome);
        assert!(text.contains("Recorded run-1: 1 tests (1 passed"));
        assert!(text.contains("✅ Run report: reports/run-1.json"));
        assert!(text.contains("❌ History not updated"));
    }

    #[test]
    fn test_usage_lists_commands() {
        let text = usage();
        for command in ["latest", "summary", "flaky", "trend <test-id>", "ingest <file|->"] {
            assert!(text.contains(command), "missing {}", command);
        }
    }
}
