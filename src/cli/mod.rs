use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::application::{AccountService, AppError, Session, DEFAULT_HISTORY_LIMIT};
use crate::domain::{format_cents, parse_cents, LedgerEntry, ParseCentsError};
use crate::io::Exporter;
use crate::storage::codec::TIMESTAMP_FORMAT;
use crate::storage::{StoreConfig, DEFAULT_ACCOUNTS_FILE, DEFAULT_LEDGER_FILE};
use crate::telemetry;

/// Teller - account and ledger engine for a small cash machine
#[derive(Parser)]
#[command(name = "teller")]
#[command(about = "Flat-file accounts with an append-only transaction ledger")]
#[command(version)]
pub struct Cli {
    /// Accounts file path
    #[arg(long, env = "TELLER_ACCOUNTS_FILE", default_value = DEFAULT_ACCOUNTS_FILE)]
    pub accounts_file: PathBuf,

    /// Ledger file path
    #[arg(long, env = "TELLER_LEDGER_FILE", default_value = DEFAULT_LEDGER_FILE)]
    pub ledger_file: PathBuf,

    /// How long to wait for another process holding the store locks
    #[arg(long, env = "TELLER_LOCK_TIMEOUT_MS", default_value = "5000")]
    pub lock_timeout_ms: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Account number and PIN of the customer at the machine
#[derive(Args)]
pub struct Credentials {
    /// Account number
    #[arg(short, long)]
    pub account: String,

    /// PIN
    #[arg(long, env = "TELLER_PIN", hide_env_values = true)]
    pub pin: String,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open a new account
    Open {
        /// Account number
        account: String,

        /// Owner's full name
        #[arg(long)]
        owner: String,

        /// PIN (at least 4 characters)
        #[arg(long, env = "TELLER_PIN", hide_env_values = true)]
        pin: String,

        /// Initial balance (e.g., "1000.00")
        #[arg(long, default_value = "0")]
        initial: String,
    },

    /// Deposit money
    Deposit {
        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,

        #[command(flatten)]
        credentials: Credentials,
    },

    /// Withdraw money
    Withdraw {
        /// Amount to withdraw (e.g., "50.00" or "50")
        amount: String,

        #[command(flatten)]
        credentials: Credentials,
    },

    /// Show the current balance
    Balance {
        #[command(flatten)]
        credentials: Credentials,
    },

    /// Show the most recent movements
    History {
        #[command(flatten)]
        credentials: Credentials,

        /// Maximum number of movements to show
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },

    /// Change the PIN
    ChangePin {
        #[command(flatten)]
        credentials: Credentials,

        /// New PIN (at least 4 characters)
        #[arg(long)]
        new_pin: String,
    },

    /// Deactivate an account
    Deactivate {
        /// Account number
        account: String,
    },

    /// Verify that every balance matches its ledger
    Check,

    /// Export an account's full history
    Export {
        #[command(flatten)]
        credentials: Credentials,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            accounts_path: self.accounts_file.clone(),
            ledger_path: self.ledger_file.clone(),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
        }
    }

    pub async fn run(self) -> Result<()> {
        telemetry::init(self.verbose);
        let service = AccountService::new(self.store_config());

        match self.command {
            Commands::Open {
                account,
                owner,
                pin,
                initial,
            } => {
                let initial = parse_cents(&initial)
                    .context("Invalid amount format. Use '1000.00' or '1000'")?;
                let account = service.open_account(&account, &owner, &pin, initial).await?;
                println!(
                    "Opened account {} for {} with balance {}",
                    account.account_id,
                    account.owner_name,
                    format_cents(account.balance)
                );
            }

            Commands::Deposit {
                amount,
                credentials,
            } => {
                let amount =
                    parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
                let mut session = login(&service, &credentials).await?;
                let receipt = service.deposit(session.require()?, amount).await?;
                println!(
                    "Deposited {}. New balance: {}",
                    format_cents(amount),
                    format_cents(receipt.account.balance)
                );
                session.refresh(receipt.account);
                session.logout();
            }

            Commands::Withdraw {
                amount,
                credentials,
            } => {
                let amount =
                    parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
                let mut session = login(&service, &credentials).await?;
                let receipt = service.withdraw(session.require()?, amount).await?;
                println!(
                    "Withdrew {}. New balance: {}",
                    format_cents(amount),
                    format_cents(receipt.account.balance)
                );
                session.refresh(receipt.account);
                session.logout();
            }

            Commands::Balance { credentials } => {
                let mut session = login(&service, &credentials).await?;
                let receipt = service.inquire_balance(session.require()?).await?;
                println!("Owner:   {}", receipt.account.owner_name);
                println!("Account: {}", receipt.account.account_id);
                println!("Balance: {}", format_cents(receipt.account.balance));
                session.logout();
            }

            Commands::History { credentials, limit } => {
                let mut session = login(&service, &credentials).await?;
                let entries = service.recent_history(session.require()?, limit).await?;
                if entries.is_empty() {
                    println!("No movements recorded.");
                }
                for entry in &entries {
                    println!("{}", format_entry(entry));
                }
                session.logout();
            }

            Commands::ChangePin {
                credentials,
                new_pin,
            } => {
                let mut session = login(&service, &credentials).await?;
                let account = service
                    .change_pin(session.require()?, &credentials.pin, &new_pin)
                    .await?;
                println!("PIN changed for account {}", account.account_id);
                session.logout();
            }

            Commands::Deactivate { account } => {
                let account = service.deactivate_account(&account).await?;
                println!("Account {} is inactive", account.account_id);
            }

            Commands::Check => {
                let report = service.check_integrity().await?;
                println!(
                    "Checked {} accounts and {} ledger entries",
                    report.account_count, report.entry_count
                );
                for issue in &report.ledger_issues {
                    println!("  ledger: {:?}", issue);
                }
                for account in report.accounts.iter().filter(|a| !a.is_consistent()) {
                    for issue in &account.issues {
                        println!("  {}: {:?}", account.account_id, issue);
                    }
                }
                if !report.is_ok() {
                    anyhow::bail!("{} integrity issue(s) found", report.issue_count());
                }
                println!("OK");
            }

            Commands::Export {
                credentials,
                format,
                output,
            } => {
                let mut session = login(&service, &credentials).await?;
                let exporter = Exporter::new(&service);
                let account = session.require()?;

                let writer: Box<dyn std::io::Write> = match &output {
                    Some(path) => Box::new(
                        std::fs::File::create(path)
                            .with_context(|| format!("Failed to create {}", path.display()))?,
                    ),
                    None => Box::new(std::io::stdout()),
                };

                match format {
                    ExportFormat::Csv => {
                        let count = exporter.export_history_csv(account, writer).await?;
                        if output.is_some() {
                            println!("Exported {} movements", count);
                        }
                    }
                    ExportFormat::Json => {
                        let statement = exporter.export_statement_json(account, writer).await?;
                        if output.is_some() {
                            println!("Exported {} movements", statement.entries.len());
                        }
                    }
                }
                session.logout();
            }
        }

        Ok(())
    }
}

/// Process exit status for a failed command: 1 when the user can fix it
/// (bad amount, wrong PIN, insufficient funds, ...), 2 for everything else.
pub fn exit_status(err: &anyhow::Error) -> u8 {
    let user_error = match err.downcast_ref::<AppError>() {
        Some(app_error) => app_error.is_recoverable(),
        None => err.downcast_ref::<ParseCentsError>().is_some(),
    };
    if user_error { 1 } else { 2 }
}

async fn login(service: &AccountService, credentials: &Credentials) -> Result<Session> {
    let account = service
        .authenticate(&credentials.account, &credentials.pin)
        .await?;
    let mut session = Session::default();
    session.login(account);
    Ok(session)
}

fn format_entry(entry: &LedgerEntry) -> String {
    format!(
        "{} | {:<15} | Amount: {:>12} | Balance: {:>12}",
        entry.timestamp.format(TIMESTAMP_FORMAT),
        entry.kind.as_str(),
        format_cents(entry.amount),
        format_cents(entry.resulting_balance)
    )
}
