//! File-backed historic store: the bounded newest-first collection plus one
//! standalone JSON artifact per run.
//!
//! Collection updates are read-modify-write under an advisory lock file and
//! land through a temporary sibling renamed over the original, so readers
//! never observe a half-written document and concurrent processes do not
//! silently drop each other's runs.

pub mod lock;
pub mod writer;

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::record::{HistoricCollection, RunRecord};

use self::lock::StoreLock;

pub use self::writer::StoreHandle;

/// Prefix shared by run ids and therefore by standalone artifact names.
pub const RUN_FILE_PREFIX: &str = "run-";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to {action} {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize run data")]
    Serialize(#[from] serde_json::Error),

    #[error("timed out after {waited_ms} ms waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("store writer is no longer running")]
    WriterClosed,

    #[error("historic recording is disabled")]
    Disabled,
}

fn io_error<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(std::io::Error) -> StoreError + 'a {
    move |source| StoreError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Directory-based run history.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
    history_file: String,
    capacity: usize,
    lock_timeout: Duration,
}

impl HistoryStore {
    /// Store under `dir` with default file name, capacity and lock timeout.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let defaults = StorageConfig::default();
        Self {
            dir: dir.into(),
            ..Self::from_config(&defaults)
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            history_file: config.history_file.clone(),
            capacity: config.capacity.max(1),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(&self.history_file)
    }

    /// Location of the standalone artifact for `run_id`.
    pub fn standalone_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.lock", self.history_file))
    }

    /// Read the collection. `Ok(None)` when no store exists yet.
    pub fn read_history(&self) -> Result<Option<HistoricCollection>, StoreError> {
        let path = self.history_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    action: "read",
                    path,
                    source,
                })
            }
        };
        let history = serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok(Some(history))
    }

    /// Read the collection, degrading to an empty one when it is missing,
    /// unreadable or unparsable.
    pub fn load(&self) -> HistoricCollection {
        match self.read_history() {
            Ok(Some(history)) => {
                debug!(path = %self.history_path().display(), runs = history.len(), "loaded run history");
                history
            }
            Ok(None) => HistoricCollection::new(),
            Err(e) => {
                warn!(error = %e, cause = ?std::error::Error::source(&e), "run history unusable, starting fresh");
                HistoricCollection::new()
            }
        }
    }

    /// Prepend `record` to the collection and rewrite it, keeping at most
    /// `capacity` runs. Returns the new collection length.
    pub fn append(&self, record: &RunRecord) -> Result<usize, StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_error("create directory", &self.dir))?;
        let _lock = StoreLock::acquire(&self.lock_path(), self.lock_timeout)?;

        let mut history = self.load();
        history.push_front(record.clone(), self.capacity);

        let bytes = serde_json::to_vec_pretty(&history)?;
        let path = self.history_path();
        write_atomic(&path, &bytes)?;

        info!(
            path = %path.display(),
            run_id = %record.id,
            runs = history.len(),
            "appended run to history"
        );
        Ok(history.len())
    }

    /// Write `record` to its own file, independent of the collection.
    pub fn write_standalone(&self, record: &RunRecord) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_error("create directory", &self.dir))?;
        let path = self.standalone_path(&record.id);
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &bytes)?;
        info!(path = %path.display(), "wrote standalone run report");
        Ok(path)
    }

    /// Newest standalone artifact by name. Run ids start with their
    /// timestamp, so lexical order is chronological.
    pub fn latest_standalone(&self) -> Result<Option<RunRecord>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    action: "list",
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let newest = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(RUN_FILE_PREFIX) && name.ends_with(".json"))
            .max();

        let Some(name) = newest else {
            return Ok(None);
        };
        let path = self.dir.join(name);
        let bytes = fs::read(&path).map_err(io_error("read", &path))?;
        let record = serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok(Some(record))
    }

    /// Most recent run: head of the collection, else the newest standalone
    /// artifact.
    pub fn latest_run(&self) -> Option<RunRecord> {
        if let Some(run) = self.load().runs.into_iter().next() {
            return Some(run);
        }
        match self.latest_standalone() {
            Ok(run) => run,
            Err(e) => {
                warn!(error = %e, "could not read standalone run report");
                None
            }
        }
    }
}

/// Replace `path` with `bytes` via a temporary sibling and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    let result = (|| {
        let mut file = fs::File::create(&tmp_path).map_err(io_error("create", &tmp_path))?;
        file.write_all(bytes).map_err(io_error("write", &tmp_path))?;
        file.sync_all().map_err(io_error("sync", &tmp_path))?;
        fs::rename(&tmp_path, path).map_err(io_error("replace", path))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
