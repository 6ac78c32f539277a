//! Event contract of the test execution engine.
//!
//! One JSON object per event, tagged by `event`. The outcome of a completed
//! test is tagged by `status`; error payloads only exist on the failing
//! variants, so a passed test can never carry one.

use serde::{Deserialize, Serialize};

use crate::record::Attachment;

/// Everything the engine reports during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RunStarted(RunStart),
    TestCompleted(TestCompletion),
    RunEnded(RunEnd),
}

/// Run-level settings announced when the run begins. All optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunStart {
    pub tool_version: Option<String>,
    pub platform_version: Option<String>,
    pub workers: Option<u32>,
    pub retries: Option<u32>,
}

/// Overall verdict of the run. Carried for completeness; the recorder
/// derives its own counts from the individual tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunVerdict {
    Passed,
    Failed,
    TimedOut,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEnd {
    pub status: RunVerdict,
}

/// Raw error as reported by the engine, before sanitising.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawError {
    pub message: Option<String>,
    pub stack: Option<String>,
}

/// Final raw outcome of one test, after the engine exhausted its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RawOutcome {
    Passed,
    Skipped,
    Failed {
        #[serde(default)]
        errors: Vec<RawError>,
    },
    TimedOut {
        #[serde(default)]
        errors: Vec<RawError>,
    },
}

impl RawOutcome {
    /// Errors attached to a failing outcome; empty for passes and skips.
    pub fn errors(&self) -> &[RawError] {
        match self {
            RawOutcome::Failed { errors } | RawOutcome::TimedOut { errors } => errors,
            RawOutcome::Passed | RawOutcome::Skipped => &[],
        }
    }
}

/// Completion of one test case, emitted once per test by any worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCompletion {
    pub title: String,
    /// Suite path from the root down to the test itself.
    #[serde(default)]
    pub title_path: Vec<String>,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(flatten)]
    pub outcome: RawOutcome,
    /// Milliseconds spent in the final attempt.
    #[serde(default)]
    pub duration: u64,
    /// Index of the final attempt; `0` means it passed or failed first time.
    #[serde(default)]
    pub retry: u32,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Engine-supplied identifier that replaces the derived slug when set.
    #[serde(default)]
    pub stable_id: Option<String>,
}

impl TestCompletion {
    /// Minimal completion, mostly useful for embedding and tests.
    pub fn new(title: impl Into<String>, file: impl Into<String>, outcome: RawOutcome) -> Self {
        Self {
            title: title.into(),
            title_path: Vec::new(),
            file: file.into(),
            line: None,
            project: None,
            outcome,
            duration: 0,
            retry: 0,
            attachments: Vec::new(),
            stable_id: None,
        }
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration = duration_ms;
        self
    }

    pub fn with_title_path(mut self, path: Vec<String>) -> Self {
        self.title_path = path;
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failed_completion() {
        let line = r#"{"event":"test_completed","title":"login works","titlePath":["auth","login works"],
            "file":"tests/auth.spec.ts","line":12,"project":"chromium","status":"failed",
            "errors":[{"message":"boom","stack":"Error: boom\n    at fn (/repo/tests/auth.spec.ts:14:7)"}],
            "duration":812,"retry":2}"#;
        let event: EngineEvent = serde_json::from_str(line).unwrap();
        let EngineEvent::TestCompleted(done) = event else {
            panic!("expected a test completion");
        };
        assert_eq!(done.retry, 2);
        assert_eq!(done.line, Some(12));
        assert_eq!(done.outcome.errors().len(), 1);
        assert!(matches!(done.outcome, RawOutcome::Failed { .. }));
    }

    #[test]
    fn test_parse_passed_ignores_stray_errors() {
        let line = r#"{"event":"test_completed","title":"t","status":"passed","errors":[]}"#;
        let event: EngineEvent = serde_json::from_str(line).unwrap();
        match event {
            EngineEvent::TestCompleted(done) => {
                assert_eq!(done.outcome, RawOutcome::Passed);
                assert_eq!(done.duration, 0);
                assert!(done.outcome.errors().is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let line = r#"{"event":"test_completed","title":"t","status":"exploded"}"#;
        assert!(serde_json::from_str::<EngineEvent>(line).is_err());
    }

    #[test]
    fn test_run_level_events() {
        let start: EngineEvent =
            serde_json::from_str(r#"{"event":"run_started","workers":4,"retries":2}"#).unwrap();
        assert_eq!(
            start,
            EngineEvent::RunStarted(RunStart {
                workers: Some(4),
                retries: Some(2),
                ..RunStart::default()
            })
        );
        let end: EngineEvent =
            serde_json::from_str(r#"{"event":"run_ended","status":"timedOut"}"#).unwrap();
        assert_eq!(end, EngineEvent::RunEnded(RunEnd { status: RunVerdict::TimedOut }));
    }
}
