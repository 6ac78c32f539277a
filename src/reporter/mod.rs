//! Reporting sink for a test execution engine.
//!
//! [`HistoricReporter`] follows the engine's reporter lifecycle
//! (`on_begin`, `on_test_end` per test, `on_end`) and persists the finished
//! run through the store writer. [`ingest`] drives the same lifecycle from a
//! JSON-lines event stream.
//!
//! Persistence problems never surface as a failed run: each write is
//! reported separately in [`ReportOutcome`] and logged.

use std::io::BufRead;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::record::{RunRecord, TestOutcome};
use crate::recorder::event::{EngineEvent, RunEnd, RunStart, RunVerdict, TestCompletion};
use crate::recorder::RunRecordBuilder;
use crate::storage::{StoreError, StoreHandle};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read event stream at line {line}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed event on line {line}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("test event received before the run started")]
    NotStarted,

    #[error("event stream contained no run")]
    EmptyStream,
}

/// What happened to a finished run.
#[derive(Debug)]
pub struct ReportOutcome {
    pub record: RunRecord,
    /// False when recording is disabled; both writes then hold
    /// `StoreError::Disabled`.
    pub persisted: bool,
    pub standalone: Result<PathBuf, StoreError>,
    pub history: Result<usize, StoreError>,
}

impl ReportOutcome {
    /// Both writes succeeded (or recording is off).
    pub fn is_complete(&self) -> bool {
        !self.persisted || (self.standalone.is_ok() && self.history.is_ok())
    }
}

pub struct HistoricReporter {
    store: Option<StoreHandle>,
    context: RunContext,
    builder: Option<RunRecordBuilder>,
}

impl HistoricReporter {
    pub fn new(store: StoreHandle, context: RunContext) -> Self {
        Self {
            store: Some(store),
            context,
            builder: None,
        }
    }

    /// Reporter that builds records but never writes them.
    pub fn disabled(context: RunContext) -> Self {
        Self {
            store: None,
            context,
            builder: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.builder.is_some()
    }

    pub fn on_begin(&mut self, settings: RunStart) {
        if let Some(previous) = self.builder.take() {
            warn!(
                run_id = %previous.run_id(),
                tests = previous.test_count(),
                "run started again before it ended, discarding unfinished run"
            );
        }
        self.builder = Some(RunRecordBuilder::start(settings));
    }

    /// Record one completed test. Callable from several workers at once.
    pub fn on_test_end(&self, event: TestCompletion) -> Result<TestOutcome, IngestError> {
        let builder = self.builder.as_ref().ok_or(IngestError::NotStarted)?;
        Ok(builder.on_test_complete(event))
    }

    /// Finalize the run and persist it: standalone artifact first, then the
    /// collection.
    pub async fn on_end(&mut self, end: RunEnd) -> Result<ReportOutcome, IngestError> {
        let builder = self.builder.take().ok_or(IngestError::NotStarted)?;
        info!(run_id = %builder.run_id(), verdict = ?end.status, "test run ended");
        let record = builder.finalize(&self.context);

        let Some(store) = &self.store else {
            info!(run_id = %record.id, "historic recording disabled, run not persisted");
            return Ok(ReportOutcome {
                record,
                persisted: false,
                standalone: Err(StoreError::Disabled),
                history: Err(StoreError::Disabled),
            });
        };

        let standalone = store.write_standalone(record.clone()).await;
        if let Err(e) = &standalone {
            warn!(run_id = %record.id, error = %e, "failed to write standalone run report");
        }
        let history = store.append(record.clone()).await;
        if let Err(e) = &history {
            warn!(run_id = %record.id, error = %e, "failed to update run history");
        }

        Ok(ReportOutcome {
            record,
            persisted: true,
            standalone,
            history,
        })
    }
}

/// Parse one line of the event stream.
pub fn parse_event(line: usize, text: &str) -> Result<EngineEvent, IngestError> {
    serde_json::from_str(text).map_err(|source| IngestError::Malformed { line, source })
}

/// Feed a JSON-lines event stream through `reporter` and return the
/// outcome of the first run it contains.
///
/// Malformed lines are logged and skipped. A test event before
/// `run_started` opens a run with default settings. A stream that ends
/// without `run_ended` is finalized as interrupted.
pub async fn ingest<R: BufRead>(
    reader: R,
    reporter: &mut HistoricReporter,
) -> Result<ReportOutcome, IngestError> {
    let mut skipped = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let text = line.map_err(|source| IngestError::Io {
            line: line_no,
            source,
        })?;
        if text.trim().is_empty() {
            continue;
        }

        let event = match parse_event(line_no, &text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, cause = ?std::error::Error::source(&e), "skipping event line");
                skipped += 1;
                continue;
            }
        };

        match event {
            EngineEvent::RunStarted(settings) => reporter.on_begin(settings),
            EngineEvent::TestCompleted(done) => {
                if !reporter.is_running() {
                    warn!(line = line_no, "test event before run_started, opening run with defaults");
                    reporter.on_begin(RunStart::default());
                }
                reporter.on_test_end(done)?;
            }
            EngineEvent::RunEnded(end) => {
                if !reporter.is_running() {
                    warn!(line = line_no, "run_ended without a run, ignoring");
                    continue;
                }
                if skipped > 0 {
                    warn!(skipped, "some event lines were skipped");
                }
                return reporter.on_end(end).await;
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, "some event lines were skipped");
    }
    if !reporter.is_running() {
        return Err(IngestError::EmptyStream);
    }
    warn!("event stream ended without run_ended, finalizing run as interrupted");
    reporter
        .on_end(RunEnd {
            status: RunVerdict::Interrupted,
        })
        .await
}
