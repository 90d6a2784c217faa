// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use teller::application::AccountService;
use teller::domain::Account;
use teller::storage::StoreConfig;
use tempfile::TempDir;

pub const PIN: &str = "1234";

/// Helper to create a test service over a temporary directory
pub fn test_service() -> Result<(AccountService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = service_in(temp_dir.path());
    Ok((service, temp_dir))
}

/// A second, independent service over the same files
pub fn service_in(dir: &Path) -> AccountService {
    AccountService::new(StoreConfig::in_dir(dir).with_lock_timeout(Duration::from_secs(10)))
}

/// Test fixture: account "001" owned by Ana with 1000.00
pub async fn open_ana(service: &AccountService) -> Result<Account> {
    Ok(service.open_account("001", "Ana", PIN, 100000).await?)
}

/// Raw contents of the ledger file
pub fn ledger_lines(service: &AccountService) -> Result<Vec<String>> {
    let path = &service.config().ledger_path;
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(str::to_string)
        .collect())
}
