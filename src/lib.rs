//! testledger -- test-run history recorder with flakiness, trend and
//! pass-rate analytics.
//!
//! This crate provides the run recorder fed by a test execution engine, the
//! bounded on-disk run history, analytics over that history, and the text
//! reports shown by the `testledger` CLI.

pub mod analysis;
pub mod config;
pub mod context;
pub mod record;
pub mod recorder;
pub mod report;
pub mod reporter;
pub mod storage;

use std::io::BufRead;

use anyhow::Result;

use crate::config::TestLedgerConfig;
use crate::context::RunContext;
use crate::reporter::{HistoricReporter, ReportOutcome};
use crate::storage::{HistoryStore, StoreHandle};

/// Record one run read from a JSON-lines event stream, using `config` for
/// the store location and `context` for run metadata.
pub async fn ingest_stream<R: BufRead>(
    reader: R,
    config: &TestLedgerConfig,
    context: RunContext,
) -> Result<ReportOutcome> {
    if !config.recorder.enabled {
        let mut sink = HistoricReporter::disabled(context);
        return Ok(reporter::ingest(reader, &mut sink).await?);
    }

    let store = HistoryStore::from_config(&config.storage);
    let (handle, writer) = StoreHandle::spawn(store);
    let mut sink = HistoricReporter::new(handle, context);
    let outcome = reporter::ingest(reader, &mut sink).await;

    // Dropping the last handle stops the writer; wait so every write lands.
    drop(sink);
    if let Err(e) = writer.await {
        tracing::warn!(error = %e, "store writer task failed");
    }
    Ok(outcome?)
}
