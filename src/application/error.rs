use thiserror::Error;

use crate::domain::{format_cents, Cents, FieldViolation};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    // Validation
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds: balance {}, requested {}", format_cents(*.balance), format_cents(*.requested))]
    InsufficientFunds { balance: Cents, requested: Cents },

    #[error("PIN must have at least {min_length} characters")]
    WeakCredential { min_length: usize },

    #[error("Invalid {field}: {violation}")]
    InvalidField {
        field: &'static str,
        violation: FieldViolation,
    },

    // Authentication
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account is inactive: {0}")]
    AccountInactive(String),

    #[error("Invalid credentials")]
    BadCredentials,

    #[error("No account is logged in")]
    NotAuthenticated,

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Could not process credential: {0}")]
    Credential(String),

    /// A ledger append failed and the account record could not be restored.
    #[error(
        "Account {account_id} updated without its ledger entry ({ledger_error}); restoring the previous record failed: {rollback_error}"
    )]
    Inconsistent {
        account_id: String,
        ledger_error: StoreError,
        rollback_error: StoreError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AppError {
    /// Expected outcomes the caller can act on (bad input, wrong PIN, ...),
    /// as opposed to storage failures.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::InvalidAmount(_)
                | AppError::InsufficientFunds { .. }
                | AppError::WeakCredential { .. }
                | AppError::InvalidField { .. }
                | AppError::AccountNotFound(_)
                | AppError::AccountInactive(_)
                | AppError::BadCredentials
                | AppError::NotAuthenticated
                | AppError::AccountAlreadyExists(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(AppError::BadCredentials.is_recoverable());
        assert!(AppError::AccountInactive("001".into()).is_recoverable());
        assert!(AppError::InsufficientFunds {
            balance: 0,
            requested: 1
        }
        .is_recoverable());

        let busy = StoreError::Busy {
            path: PathBuf::from("cuentas.txt.lock"),
            waited: Duration::from_secs(5),
        };
        assert!(!AppError::Storage(busy).is_recoverable());
        assert!(!AppError::Credential("rng unavailable".into()).is_recoverable());
    }
}
