use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::domain::{recording_time, LedgerEntry, NewEntry};

use super::codec::{decode_entry, encode_entry};
use super::{LockFile, StoreConfig, StoreError};

/// Append-only ledger file. Entries are never edited or removed.
pub struct LedgerStore {
    path: PathBuf,
    lock_timeout: Duration,
    guard: Mutex<()>,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            lock_timeout,
            guard: Mutex::new(()),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.ledger_path, config.lock_timeout)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn lock(&self) -> Result<(MutexGuard<'_, ()>, LockFile), StoreError> {
        let guard = self.guard.lock().await;
        let file = LockFile::acquire(LockFile::path_for(&self.path), self.lock_timeout)
            .await?;
        Ok((guard, file))
    }

    /// Append a new entry, assigning the next id (highest existing id + 1)
    /// and the recording time. Returns the stored entry.
    pub async fn append(&self, entry: NewEntry) -> Result<LedgerEntry, StoreError> {
        let _lock = self.lock().await?;

        let content = self.read_raw().await?;
        let existing = self.decode_all(&content)?;
        let entry_id = existing.iter().map(|e| e.entry_id).max().unwrap_or(0) + 1;
        let entry = entry.into_entry(entry_id, recording_time());

        let mut line = String::new();
        if !content.is_empty() && !content.ends_with('\n') {
            line.push('\n');
        }
        line.push_str(&encode_entry(&entry));
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        let previous_len = file
            .metadata()
            .await
            .map_err(|e| StoreError::io(&self.path, e))?
            .len();
        append_line(&mut file, previous_len, line.as_bytes())
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        info!(
            entry_id,
            account_id = %entry.account_id,
            kind = %entry.kind,
            amount = entry.amount,
            "ledger entry appended"
        );
        Ok(entry)
    }

    /// Every entry in file order.
    pub async fn list_all(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let _lock = self.lock().await?;
        let content = self.read_raw().await?;
        self.decode_all(&content)
    }

    /// Entries of one account, most recent first.
    /// A malformed line anywhere in the file fails the whole read.
    pub async fn list_by_account(&self, account_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let entries: Vec<LedgerEntry> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|e| e.account_id == account_id)
            .collect();
        Ok(most_recent_first(entries))
    }

    /// The `limit` most recent entries of one account.
    pub async fn recent_by_account(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut entries = self.list_by_account(account_id).await?;
        entries.truncate(limit);
        Ok(entries)
    }

    async fn read_raw(&self) -> Result<String, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "ledger file missing, treating as empty");
                Ok(String::new())
            }
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    fn decode_all(&self, content: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                decode_entry(line).map_err(|source| StoreError::Decode {
                    path: self.path.clone(),
                    line_no: i + 1,
                    source,
                })
            })
            .collect()
    }
}

/// File operations an append needs.
trait AppendTarget {
    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;
    async fn sync_data(&self) -> std::io::Result<()>;
    async fn set_len(&self, len: u64) -> std::io::Result<()>;
}

impl AppendTarget for tokio::fs::File {
    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        AsyncWriteExt::write_all(self, buf).await
    }

    async fn sync_data(&self) -> std::io::Result<()> {
        tokio::fs::File::sync_data(self).await
    }

    async fn set_len(&self, len: u64) -> std::io::Result<()> {
        tokio::fs::File::set_len(self, len).await
    }
}

/// Write and sync one line. On failure the file is cut back to
/// `previous_len` so no torn or unacknowledged line stays behind.
async fn append_line<F: AppendTarget>(
    file: &mut F,
    previous_len: u64,
    line: &[u8],
) -> std::io::Result<()> {
    let written = match file.write_all(line).await {
        Ok(()) => file.sync_data().await,
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        match file.set_len(previous_len).await {
            Ok(()) => warn!(error = %e, previous_len, "ledger append failed, write undone"),
            Err(truncate_error) => error!(
                error = %e,
                truncate_error = %truncate_error,
                "ledger append failed and could not be undone"
            ),
        }
        return Err(e);
    }
    Ok(())
}

/// Order by timestamp, newest first. Entries recorded in the same second
/// keep insertion order reversed, so later lines come first.
pub fn most_recent_first(mut entries: Vec<LedgerEntry>) -> Vec<LedgerEntry> {
    entries.reverse();
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::domain::EntryKind;

    fn store(dir: &TempDir) -> LedgerStore {
        LedgerStore::new(dir.path().join("movimientos.txt"), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_first_append_gets_id_one() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let first = store.append(NewEntry::deposit("001", 50000, 150000)).await.unwrap();
        let second = store.append(NewEntry::withdrawal("001", 20000, 130000)).await.unwrap();

        assert_eq!(first.entry_id, 1);
        assert_eq!(second.entry_id, 2);
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ids_continue_from_highest_existing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(
            store.path(),
            "5|001|Depósito|1.00|2025-09-25 10:00:00|1.00\n3|001|Depósito|1.00|2025-09-25 10:00:01|2.00",
        )
        .unwrap();

        let entry = store.append(NewEntry::deposit("001", 100, 300)).await.unwrap();
        assert_eq!(entry.entry_id, 6);

        // The missing trailing newline was repaired before appending
        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_list_by_account_filters_and_orders() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(
            store.path(),
            "1|001|Depósito|10.00|2025-09-25 10:00:00|10.00\n\
             2|002|Depósito|10.00|2025-09-25 11:00:00|10.00\n\
             \n\
             3|001|Retiro|5.00|2025-09-26 09:00:00|5.00\n\
             4|001|Consulta Saldo|0.00|2025-09-26 09:00:00|5.00\n",
        )
        .unwrap();

        let entries = store.list_by_account("001").await.unwrap();
        let ids: Vec<u64> = entries.iter().map(|e| e.entry_id).collect();
        assert_eq!(ids, vec![4, 3, 1]);
        assert_eq!(entries[0].kind, EntryKind::BalanceInquiry);

        let recent = store.recent_by_account("001", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].entry_id, 3);

        assert!(store.list_by_account("999").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_line_aborts_reads_and_appends() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(
            store.path(),
            "1|002|Depósito|10.00|2025-09-25 10:00:00|10.00\n2|002|Depósito|diez|2025-09-25 10:00:00|20.00\n",
        )
        .unwrap();

        let err = store.list_by_account("001").await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { line_no: 2, .. }));

        let err = store.append(NewEntry::deposit("001", 1, 1)).await.unwrap_err();
        assert!(err.is_decode());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_busy_when_lock_held_elsewhere() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::new(dir.path().join("movimientos.txt"), Duration::from_millis(30));
        let _held = LockFile::acquire(dir.path().join("movimientos.txt.lock"), Duration::from_secs(1))
            .await
            .unwrap();

        let err = store.append(NewEntry::deposit("001", 1, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Busy { .. }));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_same_second_entries_newest_line_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(
            store.path(),
            "1|001|Depósito|1.00|2025-09-25 10:00:00|1.00\n\
             2|001|Depósito|1.00|2025-09-25 10:00:05|2.00\n\
             3|001|Depósito|1.00|2025-09-25 10:00:05|3.00\n\
             4|001|Retiro|1.00|2025-09-25 10:00:05|2.00\n",
        )
        .unwrap();

        let ids: Vec<u64> = store
            .list_by_account("001")
            .await
            .unwrap()
            .iter()
            .map(|e| e.entry_id)
            .collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }

    /// In-memory append target whose write or sync can be made to fail.
    struct FlakyTarget {
        data: std::sync::Mutex<Vec<u8>>,
        torn_after: Option<usize>,
        fail_sync: bool,
    }

    impl FlakyTarget {
        fn new(content: &[u8]) -> Self {
            Self {
                data: std::sync::Mutex::new(content.to_vec()),
                torn_after: None,
                fail_sync: false,
            }
        }

        fn contents(&self) -> Vec<u8> {
            self.data.lock().unwrap().clone()
        }
    }

    impl AppendTarget for FlakyTarget {
        async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
            let data = self.data.get_mut().unwrap();
            match self.torn_after {
                Some(n) => {
                    data.extend_from_slice(&buf[..n]);
                    Err(std::io::Error::other("no space left on device"))
                }
                None => {
                    data.extend_from_slice(buf);
                    Ok(())
                }
            }
        }

        async fn sync_data(&self) -> std::io::Result<()> {
            if self.fail_sync {
                return Err(std::io::Error::other("input/output error"));
            }
            Ok(())
        }

        async fn set_len(&self, len: u64) -> std::io::Result<()> {
            self.data.lock().unwrap().truncate(len as usize);
            Ok(())
        }
    }

    const EXISTING: &[u8] = b"1|001|Dep\xc3\xb3sito|1.00|2025-09-25 10:00:00|1.00\n";
    const NEXT: &[u8] = b"2|001|Retiro|1.00|2025-09-25 10:00:01|0.00\n";

    #[tokio::test]
    async fn test_torn_write_is_cut_back() {
        let mut target = FlakyTarget::new(EXISTING);
        target.torn_after = Some(9);

        let result = append_line(&mut target, EXISTING.len() as u64, NEXT).await;
        assert!(result.is_err());
        assert_eq!(target.contents(), EXISTING);
    }

    #[tokio::test]
    async fn test_failed_sync_undoes_the_line() {
        let mut target = FlakyTarget::new(EXISTING);
        target.fail_sync = true;

        let result = append_line(&mut target, EXISTING.len() as u64, NEXT).await;
        assert!(result.is_err());
        assert_eq!(target.contents(), EXISTING);
    }

    #[tokio::test]
    async fn test_successful_append_keeps_the_line() {
        let mut target = FlakyTarget::new(EXISTING);

        append_line(&mut target, EXISTING.len() as u64, NEXT).await.unwrap();
        assert_eq!(target.contents(), [EXISTING, NEXT].concat());
    }
}
