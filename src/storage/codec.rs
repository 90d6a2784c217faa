//! Line codec for account and ledger records.
//!
//! Accounts: `accountId|ownerName|pin|balance|yyyy-MM-dd|True`
//! Ledger:   `entryId|accountId|kind|amount|yyyy-MM-dd HH:mm:ss|resultingBalance`
//!
//! Fields are not escaped. Free-text values must be checked with
//! [`validate_field`](crate::domain::validate_field) before they get here.

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::{
    format_cents, parse_cents, Account, Cents, EntryKind, LedgerEntry, FIELD_DELIMITER,
};

use super::{DecodeError, DecodeErrorKind};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ACCOUNT_FIELDS: usize = 6;
const ENTRY_FIELDS: usize = 6;

pub fn encode_account(account: &Account) -> String {
    let balance = format_cents(account.balance);
    let created_at = account.created_at.format(DATE_FORMAT).to_string();
    join_fields(&[
        &account.account_id,
        &account.owner_name,
        &account.pin_hash,
        &balance,
        &created_at,
        if account.active { "True" } else { "False" },
    ])
}

pub fn decode_account(line: &str) -> Result<Account, DecodeError> {
    let fields = split_fields(line, ACCOUNT_FIELDS)?;

    Ok(Account {
        account_id: fields[0].to_string(),
        owner_name: fields[1].to_string(),
        pin_hash: fields[2].to_string(),
        balance: decode_cents(line, "balance", fields[3])?,
        created_at: decode_date(line, fields[4])?,
        active: decode_bool(line, fields[5])?,
    })
}

pub fn encode_entry(entry: &LedgerEntry) -> String {
    let entry_id = entry.entry_id.to_string();
    let amount = format_cents(entry.amount);
    let timestamp = entry.timestamp.format(TIMESTAMP_FORMAT).to_string();
    let resulting_balance = format_cents(entry.resulting_balance);
    join_fields(&[
        &entry_id,
        &entry.account_id,
        entry.kind.as_str(),
        &amount,
        &timestamp,
        &resulting_balance,
    ])
}

pub fn decode_entry(line: &str) -> Result<LedgerEntry, DecodeError> {
    let fields = split_fields(line, ENTRY_FIELDS)?;

    let entry_id = fields[0]
        .trim()
        .parse()
        .map_err(|_| DecodeError::new(line, DecodeErrorKind::InvalidId(fields[0].to_string())))?;

    Ok(LedgerEntry {
        entry_id,
        account_id: fields[1].to_string(),
        kind: EntryKind::from_label(fields[2]),
        amount: decode_cents(line, "amount", fields[3])?,
        timestamp: decode_timestamp(line, fields[4])?,
        resulting_balance: decode_cents(line, "resulting balance", fields[5])?,
    })
}

fn join_fields(fields: &[&str]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(FIELD_DELIMITER);
        }
        line.push_str(field);
    }
    line
}

fn split_fields(line: &str, expected: usize) -> Result<Vec<&str>, DecodeError> {
    let trimmed = line.strip_suffix('\r').unwrap_or(line);
    let fields: Vec<&str> = trimmed.split(FIELD_DELIMITER).collect();
    if fields.len() != expected {
        return Err(DecodeError::new(
            line,
            DecodeErrorKind::FieldCount {
                expected,
                found: fields.len(),
            },
        ));
    }
    Ok(fields)
}

fn decode_cents(line: &str, field: &'static str, value: &str) -> Result<Cents, DecodeError> {
    parse_cents(value).map_err(|e| {
        DecodeError::new(
            line,
            DecodeErrorKind::InvalidNumber {
                field,
                value: value.to_string(),
                reason: e.to_string(),
            },
        )
    })
}

fn decode_date(line: &str, value: &str) -> Result<NaiveDate, DecodeError> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map(|dt| dt.date()))
        .map_err(|_| {
            DecodeError::new(
                line,
                DecodeErrorKind::InvalidDate {
                    field: "creation date",
                    value: value.to_string(),
                },
            )
        })
}

fn decode_timestamp(line: &str, value: &str) -> Result<NaiveDateTime, DecodeError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|_| {
        DecodeError::new(
            line,
            DecodeErrorKind::InvalidDate {
                field: "timestamp",
                value: value.to_string(),
            },
        )
    })
}

fn decode_bool(line: &str, value: &str) -> Result<bool, DecodeError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(DecodeError::new(
            line,
            DecodeErrorKind::InvalidBool(value.to_string()),
        )),
    }
}
