use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ACCOUNTS_FILE: &str = "cuentas.txt";
pub const DEFAULT_LEDGER_FILE: &str = "movimientos.txt";
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the two store files live and how long to wait for their locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub accounts_path: PathBuf,
    pub ledger_path: PathBuf,
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            accounts_path: PathBuf::from(DEFAULT_ACCOUNTS_FILE),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_FILE),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            accounts_path: dir.join(DEFAULT_ACCOUNTS_FILE),
            ledger_path: dir.join(DEFAULT_LEDGER_FILE),
            ..Self::default()
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}
