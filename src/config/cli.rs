use crate::domain::period::{parse_date, BillingMonth};
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Parser)]
#[command(name = "multishop-billing")]
#[command(about = "Scheduled billing jobs for the multishop storefront")]
pub struct CliConfig {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "billing.toml")]
    pub config: String,

    /// Run date (YYYY-MM-DD), defaults to today in UTC
    #[arg(long, global = true)]
    pub date: Option<String>,

    /// Log writes instead of sending them to the entity API
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Directory for zipped run reports, overrides [report] in the config
    #[arg(long, global = true)]
    pub report_dir: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log process CPU and memory per job")]
    pub monitor: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Compute commissions for one order or every uncalculated order
    CalculateCommission {
        #[arg(long)]
        order_id: Option<String>,
    },
    /// Settle pending commissions of a month (default: previous month)
    SettleCommissions {
        #[arg(long)]
        month: Option<String>,
    },
    /// Issue invoices for a month (default: previous month)
    GenerateInvoices {
        #[arg(long)]
        month: Option<String>,
    },
    /// Renew, expire or suspend subscriptions due on the run date
    RenewSubscriptions,
    /// Email upcoming and overdue invoice reminders
    SendReminders,
    /// Suspend tenants with lapsed subscriptions or long-overdue invoices
    SuspendTenants,
    /// Aggregate order analytics for the day before the run date
    AggregateAnalytics {
        /// Day to aggregate instead of the day before the run date
        #[arg(long)]
        day: Option<String>,
    },
    /// Run the daily job sequence; monthly jobs run on the billing day
    RunDaily,
}

impl CliConfig {
    pub fn run_date(&self) -> Result<NaiveDate> {
        match &self.date {
            Some(raw) => parse_date("--date", raw),
            None => Ok(chrono::Utc::now().date_naive()),
        }
    }

    pub fn month(&self) -> Result<Option<BillingMonth>> {
        match &self.command {
            Command::SettleCommissions { month: Some(raw) }
            | Command::GenerateInvoices { month: Some(raw) } => raw.parse().map(Some),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = Path::new(&self.base_path).join(path);
        let data = fs::read(full_path)?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = Path::new(&self.base_path).join(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(full_path, data)?;
        Ok(())
    }
}
