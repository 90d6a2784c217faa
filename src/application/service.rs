use std::path::Path;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::domain::{
    build_integrity_report, validate_field, Account, Cents, IntegrityReport, LedgerEntry,
    NewEntry, MIN_PIN_LENGTH,
};
use crate::storage::{sibling_path, AccountStore, LedgerStore, LockFile, StoreConfig};

use super::credentials::{hash_pin, verify_pin, Verification};
use super::AppError;

/// Number of entries `recent_history` returns by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Application service for the cash machine: authentication, deposits,
/// withdrawals, PIN changes and history. Every balance change updates the
/// account record and appends its ledger entry as one unit of work.
pub struct AccountService {
    config: StoreConfig,
    accounts: AccountStore,
    ledger: LedgerStore,
    unit_of_work: Mutex<()>,
}

/// Result of an operation that wrote a ledger entry.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub account: Account,
    pub entry: LedgerEntry,
}

/// Held for the duration of a unit of work.
struct UnitOfWork<'a> {
    _guard: MutexGuard<'a, ()>,
    _lock: LockFile,
}

impl AccountService {
    /// Create a new service over the given store files.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            accounts: AccountStore::from_config(&config),
            ledger: LedgerStore::from_config(&config),
            unit_of_work: Mutex::new(()),
            config,
        }
    }

    /// Service over the default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(StoreConfig::in_dir(dir))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    async fn begin(&self) -> Result<UnitOfWork<'_>, AppError> {
        let guard = self.unit_of_work.lock().await;
        let lock = LockFile::acquire(
            sibling_path(&self.config.accounts_path, ".uow.lock"),
            self.config.lock_timeout,
        )
        .await?;
        Ok(UnitOfWork {
            _guard: guard,
            _lock: lock,
        })
    }

    // ========================
    // Account lifecycle
    // ========================

    /// Open a new account with an initial balance.
    pub async fn open_account(
        &self,
        account_id: &str,
        owner_name: &str,
        pin: &str,
        initial_balance: Cents,
    ) -> Result<Account, AppError> {
        check_field("account number", account_id)?;
        check_field("owner name", owner_name)?;
        check_new_pin(pin)?;
        if initial_balance < 0 {
            return Err(AppError::InvalidAmount(
                "Initial balance cannot be negative".to_string(),
            ));
        }

        let account = Account::new(account_id, owner_name, hash_pin(pin)?, initial_balance);

        let _uow = self.begin().await?;
        if !self.accounts.create(&account).await? {
            return Err(AppError::AccountAlreadyExists(account_id.to_string()));
        }

        info!(account_id, initial_balance, "account opened");
        Ok(account)
    }

    /// Get an account by number, active or not.
    pub async fn find_account(&self, account_id: &str) -> Result<Account, AppError> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))
    }

    /// Deactivate an account. It stays readable but can no longer log in.
    pub async fn deactivate_account(&self, account_id: &str) -> Result<Account, AppError> {
        let _uow = self.begin().await?;
        let account = self.find_account(account_id).await?;
        if !account.active {
            return Ok(account);
        }

        let account = account.deactivated();
        self.accounts.update_in_place(&account).await?;
        info!(account_id, "account deactivated");
        Ok(account)
    }

    // ========================
    // Authentication
    // ========================

    /// Check an account number and PIN. Does not write a ledger entry.
    pub async fn authenticate(&self, account_id: &str, pin: &str) -> Result<Account, AppError> {
        let account = match self.accounts.find_by_id(account_id).await? {
            Some(account) => account,
            None => {
                warn!(account_id, "login for unknown account");
                return Err(AppError::AccountNotFound(account_id.to_string()));
            }
        };

        if !account.active {
            warn!(account_id, "login for inactive account");
            return Err(AppError::AccountInactive(account_id.to_string()));
        }

        match verify_pin(pin, &account.pin_hash) {
            Verification::Match => Ok(account),
            Verification::MatchNeedsRehash => self.upgrade_pin(account_id, pin).await,
            Verification::Mismatch => {
                warn!(account_id, "login with wrong PIN");
                Err(AppError::BadCredentials)
            }
        }
    }

    /// Replace a legacy plaintext PIN with its hash.
    async fn upgrade_pin(&self, account_id: &str, pin: &str) -> Result<Account, AppError> {
        let _uow = self.begin().await?;
        let mut account = self.find_account(account_id).await?;

        match verify_pin(pin, &account.pin_hash) {
            Verification::Mismatch => Err(AppError::BadCredentials),
            Verification::Match => Ok(account),
            Verification::MatchNeedsRehash => {
                account.pin_hash = hash_pin(pin)?;
                self.accounts.update_in_place(&account).await?;
                info!(account_id, "legacy PIN upgraded to hash");
                Ok(account)
            }
        }
    }

    // ========================
    // Balance operations
    // ========================

    /// Deposit a positive amount.
    pub async fn deposit(&self, account: &Account, amount: Cents) -> Result<Receipt, AppError> {
        require_positive(amount)?;

        let _uow = self.begin().await?;
        let current = self.load_active(&account.account_id).await?;
        let new_balance = current
            .balance
            .checked_add(amount)
            .ok_or_else(|| AppError::InvalidAmount("Balance would overflow".to_string()))?;

        let entry = NewEntry::deposit(&current.account_id, amount, new_balance);
        self.commit(current, new_balance, entry).await
    }

    /// Withdraw a positive amount not larger than the balance.
    pub async fn withdraw(&self, account: &Account, amount: Cents) -> Result<Receipt, AppError> {
        require_positive(amount)?;

        let _uow = self.begin().await?;
        let current = self.load_active(&account.account_id).await?;
        if amount > current.balance {
            return Err(AppError::InsufficientFunds {
                balance: current.balance,
                requested: amount,
            });
        }

        let new_balance = current.balance - amount;
        let entry = NewEntry::withdrawal(&current.account_id, amount, new_balance);
        self.commit(current, new_balance, entry).await
    }

    /// Current balance. Records a zero-amount audit entry.
    pub async fn inquire_balance(&self, account: &Account) -> Result<Receipt, AppError> {
        let _uow = self.begin().await?;
        let current = self.load_active(&account.account_id).await?;
        let entry = self
            .ledger
            .append(NewEntry::balance_inquiry(&current.account_id, current.balance))
            .await?;

        Ok(Receipt {
            account: current,
            entry,
        })
    }

    /// Write the new balance, then its ledger entry. If the ledger append
    /// fails the previous account record is put back.
    async fn commit(
        &self,
        previous: Account,
        new_balance: Cents,
        entry: NewEntry,
    ) -> Result<Receipt, AppError> {
        let updated = Account {
            balance: new_balance,
            ..previous.clone()
        };
        self.accounts.update_in_place(&updated).await?;

        match self.ledger.append(entry).await {
            Ok(entry) => {
                info!(
                    account_id = %updated.account_id,
                    entry_id = entry.entry_id,
                    kind = %entry.kind,
                    balance = new_balance,
                    "balance updated"
                );
                Ok(Receipt {
                    account: updated,
                    entry,
                })
            }
            Err(ledger_error) => {
                warn!(
                    account_id = %previous.account_id,
                    error = %ledger_error,
                    "ledger append failed, restoring account record"
                );
                match self.accounts.update_in_place(&previous).await {
                    Ok(()) => Err(AppError::Storage(ledger_error)),
                    Err(rollback_error) => {
                        error!(
                            account_id = %previous.account_id,
                            error = %rollback_error,
                            "account record could not be restored"
                        );
                        Err(AppError::Inconsistent {
                            account_id: previous.account_id,
                            ledger_error,
                            rollback_error,
                        })
                    }
                }
            }
        }
    }

    async fn load_active(&self, account_id: &str) -> Result<Account, AppError> {
        let account = self.find_account(account_id).await?;
        if !account.active {
            return Err(AppError::AccountInactive(account_id.to_string()));
        }
        Ok(account)
    }

    // ========================
    // Credentials
    // ========================

    /// Change the PIN after checking the current one.
    pub async fn change_pin(
        &self,
        account: &Account,
        current_pin: &str,
        new_pin: &str,
    ) -> Result<Account, AppError> {
        let _uow = self.begin().await?;
        let mut current = self.load_active(&account.account_id).await?;

        if !verify_pin(current_pin, &current.pin_hash).is_match() {
            warn!(account_id = %current.account_id, "PIN change with wrong current PIN");
            return Err(AppError::BadCredentials);
        }
        check_new_pin(new_pin)?;

        current.pin_hash = hash_pin(new_pin)?;
        self.accounts.update_in_place(&current).await?;
        info!(account_id = %current.account_id, "PIN changed");
        Ok(current)
    }

    // ========================
    // History and integrity
    // ========================

    /// The `limit` most recent ledger entries of an account, newest first.
    pub async fn recent_history(
        &self,
        account: &Account,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        Ok(self
            .ledger
            .recent_by_account(&account.account_id, limit)
            .await?)
    }

    /// Every ledger entry of an account, newest first.
    pub async fn history(&self, account: &Account) -> Result<Vec<LedgerEntry>, AppError> {
        Ok(self.ledger.list_by_account(&account.account_id).await?)
    }

    /// Replay the ledger against every stored balance.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let _uow = self.begin().await?;
        let accounts = self.accounts.list_all().await?;
        let entries = self.ledger.list_all().await?;

        let report = build_integrity_report(&accounts, &entries);
        if !report.is_ok() {
            warn!(issues = report.issue_count(), "integrity check found issues");
        }
        Ok(report)
    }
}

fn require_positive(amount: Cents) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }
    Ok(())
}

fn check_field(field: &'static str, value: &str) -> Result<(), AppError> {
    validate_field(value).map_err(|violation| AppError::InvalidField { field, violation })
}

fn check_new_pin(pin: &str) -> Result<(), AppError> {
    if pin.trim().is_empty() || pin.chars().count() < MIN_PIN_LENGTH {
        return Err(AppError::WeakCredential {
            min_length: MIN_PIN_LENGTH,
        });
    }
    check_field("PIN", pin)
}
