use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::{AccountId, Cents};

pub type EntryId = u64;

/// What a ledger entry records. The direction of `amount` follows from the kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    /// Audit-only entry, always carries a zero amount.
    BalanceInquiry,
    /// Any label this crate does not write itself.
    Other(String),
}

impl EntryKind {
    /// Label used in the ledger file.
    pub fn as_str(&self) -> &str {
        match self {
            EntryKind::Deposit => "Depósito",
            EntryKind::Withdrawal => "Retiro",
            EntryKind::BalanceInquiry => "Consulta Saldo",
            EntryKind::Other(label) => label,
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "Depósito" => EntryKind::Deposit,
            "Retiro" => EntryKind::Withdrawal,
            "Consulta Saldo" => EntryKind::BalanceInquiry,
            other => EntryKind::Other(other.to_string()),
        }
    }

    /// Apply an amount of this kind to a balance.
    pub fn signed(&self, amount: Cents) -> Cents {
        match self {
            EntryKind::Deposit => amount,
            EntryKind::Withdrawal => -amount,
            EntryKind::BalanceInquiry | EntryKind::Other(_) => 0,
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ledger entry. Entries are immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique across the whole ledger, strictly increasing in insertion order
    pub entry_id: EntryId,
    pub account_id: AccountId,
    pub kind: EntryKind,
    /// Non-negative magnitude
    pub amount: Cents,
    /// When the entry was recorded, at whole-second precision
    pub timestamp: NaiveDateTime,
    /// Account balance right after the operation
    pub resulting_balance: Cents,
}

impl LedgerEntry {
    pub fn signed_amount(&self) -> Cents {
        self.kind.signed(self.amount)
    }
}

/// An entry as submitted to the ledger. The ledger assigns the id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub account_id: AccountId,
    pub kind: EntryKind,
    pub amount: Cents,
    pub resulting_balance: Cents,
}

impl NewEntry {
    pub fn deposit(account_id: impl Into<AccountId>, amount: Cents, resulting_balance: Cents) -> Self {
        Self {
            account_id: account_id.into(),
            kind: EntryKind::Deposit,
            amount,
            resulting_balance,
        }
    }

    pub fn withdrawal(
        account_id: impl Into<AccountId>,
        amount: Cents,
        resulting_balance: Cents,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            kind: EntryKind::Withdrawal,
            amount,
            resulting_balance,
        }
    }

    pub fn balance_inquiry(account_id: impl Into<AccountId>, balance: Cents) -> Self {
        Self {
            account_id: account_id.into(),
            kind: EntryKind::BalanceInquiry,
            amount: 0,
            resulting_balance: balance,
        }
    }

    /// Stamp the entry with its id and recording time.
    pub fn into_entry(self, entry_id: EntryId, timestamp: NaiveDateTime) -> LedgerEntry {
        LedgerEntry {
            entry_id,
            account_id: self.account_id,
            kind: self.kind,
            amount: self.amount,
            timestamp,
            resulting_balance: self.resulting_balance,
        }
    }
}

/// Current local time at the precision the ledger file keeps.
pub fn recording_time() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
