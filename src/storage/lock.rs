use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs4::fs_std::FileExt;
use tracing::{debug, warn};

use super::{sibling_path, StoreError};

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Advisory lock shared between processes: an exclusive OS lock on a file
/// next to the data it guards. The OS drops the lock when the holder closes
/// the file or dies, so a crashed process never leaves the store locked.
///
/// The lock file itself is left in place; it only carries the pid of the
/// last holder.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    _file: File,
}

impl LockFile {
    /// Lock path guarding a given data file.
    pub fn path_for(data_path: &Path) -> PathBuf {
        sibling_path(data_path, ".lock")
    }

    /// Acquire the lock, retrying until `timeout` elapses.
    pub async fn acquire(path: impl Into<PathBuf>, timeout: Duration) -> Result<Self, StoreError> {
        let path = path.into();
        let started = Instant::now();

        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?
            .into_std()
            .await;

        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    record_holder(&path, &file);
                    debug!(path = %path.display(), "lock acquired");
                    return Ok(Self { path, _file: file });
                }
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        warn!(path = %path.display(), ?waited, "lock acquisition timed out");
                        return Err(StoreError::Busy { path, waited });
                    }
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        // Closing the file releases the OS lock.
        debug!(path = %self.path.display(), "lock released");
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs4::lock_contended_error().raw_os_error()
}

/// Holder pid, for whoever inspects a lock that is taking long.
fn record_holder(path: &Path, mut file: &File) {
    let result = file
        .set_len(0)
        .and_then(|()| writeln!(file, "{}", std::process::id()));
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to record lock holder");
    }
}
