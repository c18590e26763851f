use anyhow::Context;
use clap::Parser;
use multishop_billing::app::{execute, JobKind};
use multishop_billing::core::{JobContext, JobEngine, JobReport};
use multishop_billing::domain::period::parse_date;
use multishop_billing::utils::error::{BillingError, ErrorSeverity};
use multishop_billing::utils::{logger, validation::Validate};
use multishop_billing::{BillingConfig, CliConfig, Command, LocalStorage};

fn job_kind(command: &Command) -> JobKind {
    match command {
        Command::CalculateCommission { .. } => JobKind::CalculateCommission,
        Command::SettleCommissions { .. } => JobKind::SettleCommissions,
        Command::GenerateInvoices { .. } => JobKind::GenerateInvoices,
        Command::RenewSubscriptions => JobKind::RenewSubscriptions,
        Command::SendReminders => JobKind::SendReminders,
        Command::SuspendTenants => JobKind::SuspendTenants,
        Command::AggregateAnalytics { .. } => JobKind::AggregateAnalytics,
        Command::RunDaily => JobKind::RunDaily,
    }
}

fn job_context(cli: &CliConfig) -> Result<JobContext, BillingError> {
    let order_id = match &cli.command {
        Command::CalculateCommission { order_id } => order_id.clone(),
        _ => None,
    };
    let target_day = match &cli.command {
        Command::AggregateAnalytics { day: Some(raw) } => Some(parse_date("--day", raw)?),
        _ => None,
    };

    Ok(JobContext::new(cli.run_date()?)
        .with_month(cli.month()?)
        .with_target_day(target_day)
        .with_order_id(order_id)
        .with_dry_run(cli.dry_run))
}

fn exit_code(error: &BillingError) -> i32 {
    match error.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn fail(error: &BillingError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        error,
        error.category(),
        error.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", error.recovery_suggestion());
    eprintln!("❌ {}", error.user_friendly_message());
    eprintln!("💡 {}", error.recovery_suggestion());
    std::process::exit(exit_code(error).max(1));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();
    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting multishop-billing {}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("CLI config: {:?}", cli);

    let mut config = BillingConfig::from_file(&cli.config).unwrap_or_else(|e| fail(&e));
    if let Some(dir) = &cli.report_dir {
        config.report.output_dir = Some(dir.clone());
    }
    if let Err(e) = config.validate() {
        fail(&e);
    }
    let ctx = job_context(&cli).unwrap_or_else(|e| fail(&e));
    let kind = job_kind(&cli.command);

    let mut engine = JobEngine::new().with_monitoring(cli.monitor || config.monitoring_enabled());
    if let Some(dir) = &config.report.output_dir {
        engine = engine.with_archive(LocalStorage::new(dir.clone()), "");
    }

    let reports: Vec<JobReport> = execute(kind, &config.store, config.policy.clone(), &engine, &ctx)
        .await
        .unwrap_or_else(|e| fail(&e));

    let rendered = if reports.len() == 1 {
        serde_json::to_string_pretty(&reports[0])
    } else {
        serde_json::to_string_pretty(&reports)
    }
    .context("could not render job report")?;
    println!("{}", rendered);

    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| !r.success())
        .map(|r| r.job.as_str())
        .collect();
    if failed.is_empty() {
        tracing::info!("✅ {} completed", kind);
        Ok(())
    } else {
        tracing::warn!("⚠️ Completed with failures in: {}", failed.join(", "));
        std::process::exit(2);
    }
}
