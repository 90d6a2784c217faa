use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::Account;

use super::codec::{decode_account, encode_account};
use super::{sibling_path, LockFile, StoreConfig, StoreError};

/// The account table: one line per account, updated by whole-file rewrite.
pub struct AccountStore {
    path: PathBuf,
    lock_timeout: Duration,
    guard: Mutex<()>,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            lock_timeout,
            guard: Mutex::new(()),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.accounts_path, config.lock_timeout)
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

    /// Append a new account. Returns `false` without writing anything if
    /// the id is already taken.
    pub async fn create(&self, account: &Account) -> Result<bool, StoreError> {
        let _lock = self.lock().await?;

        let content = self.read_raw().await?.unwrap_or_default();
        let existing = self.decode_all(&content)?;
        if existing.iter().any(|a| a.account_id == account.account_id) {
            debug!(account_id = %account.account_id, "account id already taken");
            return Ok(false);
        }

        let mut line = String::new();
        if !content.is_empty() && !content.ends_with('\n') {
            line.push('\n');
        }
        line.push_str(&encode_account(account));
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.sync_data()
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        info!(account_id = %account.account_id, "account created");
        Ok(true)
    }

    /// First account with the given id.
    pub async fn find_by_id(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        let _lock = self.lock().await?;

        let Some(content) = self.read_raw().await? else {
            return Ok(None);
        };
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let account = self.decode_line(i, line)?;
            if account.account_id == account_id {
                return Ok(Some(account));
            }
        }
        Ok(None)
    }

    /// Every account in file order.
    pub async fn list_all(&self) -> Result<Vec<Account>, StoreError> {
        let _lock = self.lock().await?;
        let content = self.read_raw().await?.unwrap_or_default();
        self.decode_all(&content)
    }

    /// Replace the stored record of `account.account_id`, leaving every other
    /// line untouched. The new file is written beside the old one and
    /// renamed over it.
    pub async fn update_in_place(&self, account: &Account) -> Result<(), StoreError> {
        let _lock = self.lock().await?;

        let content = self
            .read_raw()
            .await?
            .ok_or_else(|| StoreError::AccountNotFound(account.account_id.clone()))?;

        let encoded = encode_account(account);
        let mut replaced = false;
        let mut lines = Vec::new();
        for (i, raw) in content.split('\n').enumerate() {
            if raw.trim().is_empty() {
                lines.push(raw.to_string());
                continue;
            }
            let current = self.decode_line(i, raw)?;
            if current.account_id == account.account_id {
                replaced = true;
                let ending = if raw.ends_with('\r') { "\r" } else { "" };
                lines.push(format!("{}{}", encoded, ending));
            } else {
                lines.push(raw.to_string());
            }
        }

        if !replaced {
            return Err(StoreError::AccountNotFound(account.account_id.clone()));
        }

        self.write_atomically(&lines.join("\n")).await?;
        info!(account_id = %account.account_id, balance = account.balance, "account updated");
        Ok(())
    }

    async fn write_atomically(&self, content: &str) -> Result<(), StoreError> {
        let tmp_path = sibling_path(&self.path, &format!(".{}.tmp", Uuid::new_v4()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &self.path).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::io(&self.path, e));
        }
        Ok(())
    }

    async fn read_raw(&self) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    fn decode_line(&self, index: usize, line: &str) -> Result<Account, StoreError> {
        decode_account(line).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            line_no: index + 1,
            source,
        })
    }

    fn decode_all(&self, content: &str) -> Result<Vec<Account>, StoreError> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| self.decode_line(i, line))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;

    fn store(dir: &TempDir) -> AccountStore {
        AccountStore::new(dir.path().join("cuentas.txt"), Duration::from_secs(1))
    }

    fn ana() -> Account {
        Account::new("001", "Ana", "1234", 100000)
            .with_created_at(NaiveDate::from_ymd_opt(2025, 9, 25).unwrap())
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(store.create(&ana()).await.unwrap());

        let found = store.find_by_id("001").await.unwrap().unwrap();
        assert_eq!(found, ana());
        assert!(store.find_by_id("002").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_does_not_write() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(store.create(&ana()).await.unwrap());
        let before = std::fs::read_to_string(store.path()).unwrap();

        let clash = Account::new("001", "Otro", "9999", 0);
        assert!(!store.create(&clash).await.unwrap());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_create_aborts_on_malformed_line() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), "001|Ana|1234|1000.00|2025-09-25\n").unwrap();

        let err = store.create(&ana()).await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { line_no: 1, .. }));
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "001|Ana|1234|1000.00|2025-09-25\n"
        );
    }

    #[tokio::test]
    async fn test_find_in_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).find_by_id("001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_preserves_other_lines() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let original = "000|Zoe|1111|10|2024-01-15|True\r\n\
                        001|Ana|1234|1000.00|2025-09-25|True\n\
                        \n\
                        002|Luis|4321|5.5|2024-02-01|false\n";
        std::fs::write(store.path(), original).unwrap();

        let mut updated = ana();
        updated.balance = 150000;
        store.update_in_place(&updated).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "000|Zoe|1111|10|2024-01-15|True\r\n\
             001|Ana|1234|1500.00|2025-09-25|True\n\
             \n\
             002|Luis|4321|5.5|2024-02-01|false\n"
        );

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_account() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let err = store.update_in_place(&ana()).await.unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(_)));

        store.create(&Account::new("002", "Luis", "4321", 0)).await.unwrap();
        let err = store.update_in_place(&ana()).await.unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(id) if id == "001"));
    }

    #[tokio::test]
    async fn test_list_all_in_file_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create(&Account::new("002", "Luis", "4321", 0)).await.unwrap();
        store.create(&ana()).await.unwrap();

        let ids: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.account_id)
            .collect();
        assert_eq!(ids, vec!["002", "001"]);
    }
}
