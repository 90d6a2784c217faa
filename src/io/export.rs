use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::AccountService;
use crate::domain::{format_cents, Account, LedgerEntry};
use crate::storage::codec::TIMESTAMP_FORMAT;

/// Account statement for JSON export
#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub account: Account,
    /// Oldest first
    pub entries: Vec<LedgerEntry>,
}

/// Exporter for an account's ledger history
pub struct Exporter<'a> {
    service: &'a AccountService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a AccountService) -> Self {
        Self { service }
    }

    async fn entries_oldest_first(&self, account: &Account) -> Result<Vec<LedgerEntry>> {
        let mut entries = self.service.history(account).await?;
        entries.reverse();
        Ok(entries)
    }

    /// Export the account's history to CSV format
    pub async fn export_history_csv<W: Write>(&self, account: &Account, writer: W) -> Result<usize> {
        let entries = self.entries_oldest_first(account).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "entry_id",
            "timestamp",
            "kind",
            "amount",
            "resulting_balance",
        ])?;

        for entry in &entries {
            csv_writer.write_record(&[
                entry.entry_id.to_string(),
                entry.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                entry.kind.to_string(),
                format_cents(entry.amount),
                format_cents(entry.resulting_balance),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    /// Export the account and its history as a JSON statement
    pub async fn export_statement_json<W: Write>(
        &self,
        account: &Account,
        mut writer: W,
    ) -> Result<Statement> {
        let statement = Statement {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            account: self.service.find_account(&account.account_id).await?,
            entries: self.entries_oldest_first(account).await?,
        };

        let json = serde_json::to_string_pretty(&statement)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(statement)
    }
}
