//! Advisory lock guarding collection updates across processes.
//!
//! The lock is a kernel file lock on `<history_file>.lock`. The kernel drops
//! it when the holder exits, so a crashed writer never leaves the store
//! locked. The lock file itself stays on disk; unlinking it while another
//! writer waits on the same inode would let two writers hold "the" lock.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use super::StoreError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct StoreLock {
    _file: File,
}

impl StoreLock {
    /// Lock `path` exclusively, waiting up to `timeout` for another holder.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| StoreError::Io {
                action: "open lock",
                path: path.to_path_buf(),
                source,
            })?;

        let started = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!(path = %path.display(), "acquired store lock");
                    return Ok(Self { _file: file });
                }
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(StoreError::LockTimeout {
                            path: path.to_path_buf(),
                            waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(source) => {
                    return Err(StoreError::Io {
                        action: "lock",
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
