//! Single-writer actor in front of a [`HistoryStore`].
//!
//! Every store mutation in the process goes through one channel and is
//! applied by one blocking task, in arrival order.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{HistoryStore, StoreError};
use crate::record::RunRecord;

const QUEUE_DEPTH: usize = 16;

enum Command {
    Append {
        record: Box<RunRecord>,
        reply: oneshot::Sender<Result<usize, StoreError>>,
    },
    WriteStandalone {
        record: Box<RunRecord>,
        reply: oneshot::Sender<Result<PathBuf, StoreError>>,
    },
}

/// Cloneable handle to the writer task. The task exits once every handle
/// has been dropped.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<Command>,
}

impl StoreHandle {
    /// Start the writer on the blocking pool. Must be called inside a Tokio
    /// runtime.
    pub fn spawn(store: HistoryStore) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Command>(QUEUE_DEPTH);
        let task = tokio::task::spawn_blocking(move || {
            debug!(dir = %store.dir().display(), "store writer started");
            while let Some(command) = rx.blocking_recv() {
                match command {
                    Command::Append { record, reply } => {
                        let _ = reply.send(store.append(&record));
                    }
                    Command::WriteStandalone { record, reply } => {
                        let _ = reply.send(store.write_standalone(&record));
                    }
                }
            }
            debug!("store writer stopped");
        });
        (Self { tx }, task)
    }

    /// Append a run to the collection; resolves to the new collection length.
    pub async fn append(&self, record: RunRecord) -> Result<usize, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Append {
                record: Box::new(record),
                reply,
            })
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)?
    }

    /// Write a run's standalone artifact; resolves to its path.
    pub async fn write_standalone(&self, record: RunRecord) -> Result<PathBuf, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::WriteStandalone {
                record: Box::new(record),
                reply,
            })
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::run;
    use chrono::Utc;

    #[tokio::test]
    async fn test_appends_are_serialised() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).with_capacity(10);
        let (handle, task) = StoreHandle::spawn(store.clone());

        let mut joins = Vec::new();
        for i in 0..12 {
            let handle = handle.clone();
            joins.push(tokio::spawn(async move {
                handle.append(run(&format!("run-{:02}", i), Utc::now(), vec![])).await
            }));
        }
        for join in joins {
            join.await.unwrap().unwrap();
        }

        let path = handle
            .write_standalone(run("run-standalone", Utc::now(), vec![]))
            .await
            .unwrap();
        assert!(path.exists());

        drop(handle);
        task.await.unwrap();
        assert_eq!(store.load().len(), 10);
    }

    #[tokio::test]
    async fn test_closed_writer_reports_error() {
        let (tx, rx) = mpsc::channel::<Command>(1);
        drop(rx);
        let closed = StoreHandle { tx };
        let err = closed.append(run("run-x", Utc::now(), vec![])).await.unwrap_err();
        assert!(matches!(err, StoreError::WriterClosed));
    }
}
