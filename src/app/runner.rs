use crate::adapters::{DryRunStore, HttpEntityStore, NullNotifier};
use crate::config::StoreSettings;
use crate::core::analytics::AnalyticsJob;
use crate::core::commission::CommissionJob;
use crate::core::engine::JobEngine;
use crate::core::invoicing::InvoiceJob;
use crate::core::job::{BillingServices, Job, JobContext, JobReport};
use crate::core::reminders::ReminderJob;
use crate::core::renewal::RenewalJob;
use crate::core::sequence::JobSequence;
use crate::core::settlement::SettlementJob;
use crate::core::suspension::SuspensionJob;
use crate::domain::policy::BillingPolicy;
use crate::domain::ports::{EntityStore, Notifier, Storage};
use crate::utils::error::{BillingError, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Every job that can be started on its own, plus the daily sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    CalculateCommission,
    SettleCommissions,
    GenerateInvoices,
    RenewSubscriptions,
    SendReminders,
    SuspendTenants,
    AggregateAnalytics,
    RunDaily,
}

impl JobKind {
    pub const ALL: [JobKind; 8] = [
        JobKind::CalculateCommission,
        JobKind::SettleCommissions,
        JobKind::GenerateInvoices,
        JobKind::RenewSubscriptions,
        JobKind::SendReminders,
        JobKind::SuspendTenants,
        JobKind::AggregateAnalytics,
        JobKind::RunDaily,
    ];

    /// Name the job reports under.
    pub fn job_name(&self) -> &'static str {
        match self {
            Self::CalculateCommission => "calculate_order_commission",
            Self::SettleCommissions => "process_monthly_commission_settlement",
            Self::GenerateInvoices => "generate_monthly_invoices",
            Self::RenewSubscriptions => "process_subscription_renewal",
            Self::SendReminders => "send_billing_reminders",
            Self::SuspendTenants => "suspend_expired_tenants",
            Self::AggregateAnalytics => "aggregate_analytics",
            Self::RunDaily => "run_daily",
        }
    }

    /// CLI subcommand spelling.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::CalculateCommission => "calculate-commission",
            Self::SettleCommissions => "settle-commissions",
            Self::GenerateInvoices => "generate-invoices",
            Self::RenewSubscriptions => "renew-subscriptions",
            Self::SendReminders => "send-reminders",
            Self::SuspendTenants => "suspend-tenants",
            Self::AggregateAnalytics => "aggregate-analytics",
            Self::RunDaily => "run-daily",
        }
    }

    fn job<S, N>(&self, services: &BillingServices<S, N>) -> Option<Box<dyn Job>>
    where
        S: EntityStore + 'static,
        N: Notifier + 'static,
    {
        let services = services.clone();
        let job: Box<dyn Job> = match self {
            Self::CalculateCommission => Box::new(CommissionJob::new(services)),
            Self::SettleCommissions => Box::new(SettlementJob::new(services)),
            Self::GenerateInvoices => Box::new(InvoiceJob::new(services)),
            Self::RenewSubscriptions => Box::new(RenewalJob::new(services)),
            Self::SendReminders => Box::new(ReminderJob::new(services)),
            Self::SuspendTenants => Box::new(SuspensionJob::new(services)),
            Self::AggregateAnalytics => Box::new(AnalyticsJob::new(services)),
            Self::RunDaily => return None,
        };
        Some(job)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.job_name())
    }
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Accepts the job name (`send_billing_reminders`), its camelCase form
/// (`sendBillingReminders`) or the CLI subcommand (`send-reminders`).
impl FromStr for JobKind {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|kind| {
                normalize(kind.job_name()) == wanted || normalize(kind.command_name()) == wanted
            })
            .ok_or_else(|| BillingError::InvalidConfigValueError {
                field: "job".to_string(),
                value: s.to_string(),
                reason: format!(
                    "unknown job, expected one of: {}",
                    Self::ALL.map(|k| k.job_name()).join(", ")
                ),
            })
    }
}

/// Runs one job, or the daily sequence, against the given services.
///
/// A single job that aborts is an error; inside the daily sequence an
/// aborted job only produces a failed report.
pub async fn run_kind<S, N, St>(
    kind: JobKind,
    services: &BillingServices<S, N>,
    engine: &JobEngine<St>,
    ctx: &JobContext,
) -> Result<Vec<JobReport>>
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
    St: Storage,
{
    match kind.job(services) {
        Some(job) => Ok(vec![engine.run(job.as_ref(), ctx).await?]),
        None => {
            let sequence = JobSequence::daily(services);
            tracing::info!("📋 Daily sequence: {}", sequence.names().join(" -> "));
            Ok(engine.run_sequence(&sequence, ctx).await)
        }
    }
}

/// Connects to the entity API and runs `kind`. In dry-run mode writes are
/// simulated and no email leaves the process.
pub async fn execute<St: Storage>(
    kind: JobKind,
    settings: &StoreSettings,
    policy: BillingPolicy,
    engine: &JobEngine<St>,
    ctx: &JobContext,
) -> Result<Vec<JobReport>> {
    let store = HttpEntityStore::new(settings)?;

    if ctx.dry_run {
        tracing::info!("🧪 Dry run: writes and emails are logged only");
        let services = BillingServices::new(
            Arc::new(DryRunStore::new(store)),
            Arc::new(NullNotifier),
            policy,
        );
        let reports = run_kind(kind, &services, engine, ctx).await?;
        tracing::info!(
            "🧪 Dry run finished, {} write(s) skipped",
            services.entities.store().planned_writes()
        );
        return Ok(reports);
    }

    let notifier = Arc::new(store.notifier(&policy.notifications.from_name));
    let services = BillingServices::new(Arc::new(store), notifier, policy);
    run_kind(kind, &services, engine, ctx).await
}
