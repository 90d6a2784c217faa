use chrono::{Local, NaiveDate};
use serde::Serialize;

use super::Cents;

pub type AccountId = String;

/// Field separator of the persisted line format.
pub const FIELD_DELIMITER: char = '|';

/// Minimum number of characters a PIN must have.
pub const MIN_PIN_LENGTH: usize = 4;

/// A customer account. Accounts are never deleted, only deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub account_id: AccountId,
    pub owner_name: String,
    /// Stored credential. An Argon2 PHC string, or a plaintext PIN in
    /// files that predate hashing.
    #[serde(skip_serializing)]
    pub pin_hash: String,
    pub balance: Cents,
    pub created_at: NaiveDate,
    /// Inactive accounts can be read but not authenticated against.
    pub active: bool,
}

impl Account {
    pub fn new(
        account_id: impl Into<AccountId>,
        owner_name: impl Into<String>,
        pin_hash: impl Into<String>,
        balance: Cents,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            owner_name: owner_name.into(),
            pin_hash: pin_hash.into(),
            balance,
            created_at: Local::now().date_naive(),
            active: true,
        }
    }

    pub fn with_created_at(mut self, created_at: NaiveDate) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Reasons a free-text field cannot be stored in a delimited line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldViolation {
    Empty,
    ContainsDelimiter,
    ContainsLineBreak,
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldViolation::Empty => write!(f, "must not be empty"),
            FieldViolation::ContainsDelimiter => {
                write!(f, "must not contain '{}'", FIELD_DELIMITER)
            }
            FieldViolation::ContainsLineBreak => write!(f, "must not contain line breaks"),
        }
    }
}

/// Check that a value can be written as a single field of a record line.
pub fn validate_field(value: &str) -> Result<(), FieldViolation> {
    if value.trim().is_empty() {
        return Err(FieldViolation::Empty);
    }
    if value.contains(FIELD_DELIMITER) {
        return Err(FieldViolation::ContainsDelimiter);
    }
    if value.contains(['\n', '\r']) {
        return Err(FieldViolation::ContainsLineBreak);
    }
    Ok(())
}
