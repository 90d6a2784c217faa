use std::collections::HashSet;

use serde::Serialize;

use super::{Account, AccountId, Cents, EntryId, EntryKind, LedgerEntry};

/// Something in the stored data that breaks a ledger invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// An entry's resulting balance does not follow from the previous one.
    BrokenChain {
        entry_id: EntryId,
        expected: Cents,
        recorded: Cents,
    },
    NegativeAmount {
        entry_id: EntryId,
    },
    InquiryWithAmount {
        entry_id: EntryId,
    },
    /// The stored balance differs from the replayed ledger.
    BalanceMismatch {
        account_id: AccountId,
        replayed: Cents,
        stored: Cents,
    },
    DuplicateEntryId {
        entry_id: EntryId,
    },
    NonIncreasingEntryId {
        previous: EntryId,
        entry_id: EntryId,
    },
    OrphanEntry {
        entry_id: EntryId,
        account_id: AccountId,
    },
    /// Replaying this entry leaves the representable range of balances.
    BalanceOverflow {
        entry_id: EntryId,
    },
}

/// Replay result for a single account.
#[derive(Debug, Clone, Serialize)]
pub struct AccountIntegrity {
    pub account_id: AccountId,
    pub stored_balance: Cents,
    /// Balance before the first recorded entry
    pub opening_balance: Cents,
    pub replayed_balance: Cents,
    pub entry_count: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl AccountIntegrity {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Result of checking every account against the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub entry_count: usize,
    pub accounts: Vec<AccountIntegrity>,
    pub ledger_issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.ledger_issues.is_empty() && self.accounts.iter().all(|a| a.is_consistent())
    }

    pub fn issue_count(&self) -> usize {
        self.ledger_issues.len() + self.accounts.iter().map(|a| a.issues.len()).sum::<usize>()
    }
}

/// Replay one account's entries (in ledger file order) and compare the
/// result with the stored balance.
pub fn check_account(account: &Account, entries: &[&LedgerEntry]) -> AccountIntegrity {
    let mut issues = Vec::new();

    let opening_balance = match entries.first() {
        Some(first) => first
            .resulting_balance
            .checked_sub(first.signed_amount())
            .unwrap_or_else(|| {
                issues.push(IntegrityIssue::BalanceOverflow {
                    entry_id: first.entry_id,
                });
                first.resulting_balance
            }),
        None => account.balance,
    };

    let mut running = opening_balance;
    for entry in entries {
        if entry.amount < 0 {
            issues.push(IntegrityIssue::NegativeAmount {
                entry_id: entry.entry_id,
            });
        }
        if entry.kind == EntryKind::BalanceInquiry && entry.amount != 0 {
            issues.push(IntegrityIssue::InquiryWithAmount {
                entry_id: entry.entry_id,
            });
        }

        // Entries of unknown kind carry no direction, so the chain resyncs on them.
        if !matches!(entry.kind, EntryKind::Other(_)) {
            match running.checked_add(entry.signed_amount()) {
                Some(expected) if expected != entry.resulting_balance => {
                    issues.push(IntegrityIssue::BrokenChain {
                        entry_id: entry.entry_id,
                        expected,
                        recorded: entry.resulting_balance,
                    });
                }
                Some(_) => {}
                None => issues.push(IntegrityIssue::BalanceOverflow {
                    entry_id: entry.entry_id,
                }),
            }
        }
        running = entry.resulting_balance;
    }

    if running != account.balance {
        issues.push(IntegrityIssue::BalanceMismatch {
            account_id: account.account_id.clone(),
            replayed: running,
            stored: account.balance,
        });
    }

    AccountIntegrity {
        account_id: account.account_id.clone(),
        stored_balance: account.balance,
        opening_balance,
        replayed_balance: running,
        entry_count: entries.len(),
        issues,
    }
}

/// Ledger-wide checks: id uniqueness and ordering, plus entries that
/// reference no known account.
pub fn check_ledger(entries: &[LedgerEntry], accounts: &[Account]) -> Vec<IntegrityIssue> {
    let known: HashSet<&str> = accounts.iter().map(|a| a.account_id.as_str()).collect();
    let mut seen = HashSet::new();
    let mut previous: Option<EntryId> = None;
    let mut issues = Vec::new();

    for entry in entries {
        if !seen.insert(entry.entry_id) {
            issues.push(IntegrityIssue::DuplicateEntryId {
                entry_id: entry.entry_id,
            });
        } else if let Some(prev) = previous.filter(|prev| entry.entry_id <= *prev) {
            issues.push(IntegrityIssue::NonIncreasingEntryId {
                previous: prev,
                entry_id: entry.entry_id,
            });
        }
        previous = Some(entry.entry_id);

        if !known.contains(entry.account_id.as_str()) {
            issues.push(IntegrityIssue::OrphanEntry {
                entry_id: entry.entry_id,
                account_id: entry.account_id.clone(),
            });
        }
    }

    issues
}

/// Build a full report from every account and every ledger entry (file order).
pub fn build_integrity_report(accounts: &[Account], entries: &[LedgerEntry]) -> IntegrityReport {
    let per_account = accounts
        .iter()
        .map(|account| {
            let own: Vec<&LedgerEntry> = entries
                .iter()
                .filter(|e| e.account_id == account.account_id)
                .collect();
            check_account(account, &own)
        })
        .collect();

    IntegrityReport {
        account_count: accounts.len(),
        entry_count: entries.len(),
        accounts: per_account,
        ledger_issues: check_ledger(entries, accounts),
    }
}
