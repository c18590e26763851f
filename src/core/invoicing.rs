use crate::core::job::{BillingServices, ItemResult, Job, JobContext, JobReport};
use crate::domain::model::{
    BillingCycle, Commission, CommissionStatus, Invoice, InvoiceStatus, Subscription,
    SubscriptionStatus, Tenant, TenantStatus,
};
use crate::domain::period::BillingMonth;
use crate::domain::ports::{EntityStore, Notifier, Query};
use crate::utils::error::{BillingError, Result};
use chrono::Duration;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashMap, HashSet};

/// Subscription charge for `month`. Yearly plans are billed once, in the
/// month their current period starts.
pub fn subscription_fee(subscription: &Subscription, month: BillingMonth) -> Decimal {
    match subscription.status {
        SubscriptionStatus::Active | SubscriptionStatus::PastDue => {}
        _ => return Decimal::ZERO,
    }
    match subscription.billing_cycle {
        BillingCycle::Monthly => subscription.monthly_fee,
        BillingCycle::Yearly => match subscription.current_period_start {
            Some(start) if month.contains(start) => {
                subscription.monthly_fee * Decimal::from(BillingCycle::Yearly.months())
            }
            _ => Decimal::ZERO,
        },
    }
}

pub fn invoice_number(prefix: &str, month: BillingMonth, seq: usize) -> String {
    format!("{}-{}-{:04}", prefix, month.compact(), seq)
}

/// Sequence part of a number issued by [`invoice_number`] for `month`.
pub fn invoice_sequence(prefix: &str, month: BillingMonth, number: &str) -> Option<usize> {
    number
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_prefix(month.compact().as_str())?
        .strip_prefix('-')?
        .parse()
        .ok()
}

/// Issues one invoice per active tenant for the month: subscription fee
/// plus settled, not yet invoiced commissions.
pub struct InvoiceJob<S: EntityStore, N: Notifier> {
    services: BillingServices<S, N>,
    billing_day_only: bool,
}

impl<S: EntityStore, N: Notifier> InvoiceJob<S, N> {
    pub fn new(services: BillingServices<S, N>) -> Self {
        Self {
            services,
            billing_day_only: false,
        }
    }

    pub fn on_billing_day_only(mut self) -> Self {
        self.billing_day_only = true;
        self
    }

    async fn invoice_tenant(
        &self,
        tenant: &Tenant,
        month: BillingMonth,
        subscription: Option<&Subscription>,
        commissions: &[Commission],
        seq: &mut usize,
        ctx: &JobContext,
    ) -> Result<ItemResult> {
        let policy = &self.services.policy.invoice;

        let fee = subscription
            .map(|s| subscription_fee(s, month))
            .unwrap_or(Decimal::ZERO);
        let commission_total: Decimal = commissions.iter().map(|c| c.commission_amount).sum();
        let total = fee + commission_total;
        if total.is_zero() {
            return Ok(ItemResult::Skipped("nothing to bill".to_string()));
        }

        let next = *seq + 1;
        let invoice = Invoice {
            id: String::new(),
            tenant_id: tenant.id.clone(),
            invoice_number: invoice_number(&policy.number_prefix, month, next),
            billing_period: month.to_string(),
            subscription_fee: fee,
            commission_total,
            total_amount: total,
            currency: policy.currency.clone(),
            status: InvoiceStatus::Pending,
            issue_date: ctx.run_date,
            due_date: ctx.run_date + Duration::days(i64::from(policy.due_days)),
            reminder_count: 0,
            overdue_reminder_count: 0,
            last_reminder_date: None,
            paid_date: None,
        };
        let created = self.services.entities.create(&invoice).await?;
        *seq = next;

        let mut unlinked = Vec::new();
        for commission in commissions {
            let patch = json!({
                "status": CommissionStatus::Invoiced,
                "invoice_id": created.id,
            });
            if let Err(e) = self
                .services
                .entities
                .update::<Commission>(&commission.id, patch)
                .await
            {
                tracing::error!("❌ Commission {} not linked to {}: {}", commission.id, created.id, e);
                unlinked.push(commission.id.clone());
            }
        }

        self.services
            .notify(
                tenant.owner_email.as_deref(),
                format!("[{}] Invoice {} for {}", tenant.name, created.invoice_number, month),
                format!(
                    "Hello {},\n\nYour invoice for {} has been issued.\n\n\
                     Subscription fee: {} {}\nCommission: {} {}\nTotal due: {} {}\n\
                     Due date: {}\n\nThank you for selling with us.",
                    tenant.name,
                    month,
                    fee,
                    created.currency,
                    commission_total,
                    created.currency,
                    total,
                    created.currency,
                    created.due_date
                ),
            )
            .await;

        if !unlinked.is_empty() {
            return Err(BillingError::JobError {
                job: "invoicing".to_string(),
                message: format!(
                    "invoice {} issued but commissions {} were not linked and may be billed again",
                    created.invoice_number,
                    unlinked.join(", ")
                ),
            });
        }

        Ok(ItemResult::Done(format!(
            "invoice {} issued: {} {} due {}",
            created.invoice_number, total, created.currency, created.due_date
        )))
    }
}

#[async_trait::async_trait]
impl<S, N> Job for InvoiceJob<S, N>
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
{
    fn name(&self) -> &'static str {
        "generate_monthly_invoices"
    }

    fn should_run(&self, ctx: &JobContext) -> bool {
        !self.billing_day_only
            || chrono::Datelike::day(&ctx.run_date) == self.services.policy.invoice.billing_day
    }

    async fn run(&self, ctx: &JobContext) -> Result<JobReport> {
        let month = ctx.billing_month();
        let mut report = JobReport::new(self.name(), ctx);
        let entities = &self.services.entities;

        let listed = entities
            .filter::<Tenant>(&Query::new().eq("status", TenantStatus::Active))
            .await?;
        let tenants = report.accept(listed);

        let prefix = &self.services.policy.invoice.number_prefix;
        let existing = entities
            .filter::<Invoice>(&Query::new().eq("billing_period", month.to_string()))
            .await?;
        // unreadable invoices still count for idempotency and numbering
        let mut invoiced: HashSet<String> = HashSet::new();
        let mut seq = 0usize;
        for (tenant_id, number) in existing
            .records
            .iter()
            .map(|i| (Some(i.tenant_id.as_str()), Some(i.invoice_number.as_str())))
            .chain(
                existing
                    .rejected
                    .iter()
                    .map(|r| (r.field("tenant_id"), r.field("invoice_number"))),
            )
        {
            if let Some(tenant_id) = tenant_id {
                invoiced.insert(tenant_id.to_string());
            }
            if let Some(n) = number.and_then(|n| invoice_sequence(prefix, month, n)) {
                seq = seq.max(n);
            }
        }
        report.accept(existing);

        // tenants with unreadable billing records are not invoiced from a partial view
        let mut unreadable: HashSet<String> = HashSet::new();

        let listed = entities.list::<Subscription>().await?;
        unreadable.extend(
            listed
                .rejected
                .iter()
                .filter_map(|r| r.field("tenant_id").map(str::to_string)),
        );
        let mut subscriptions: HashMap<String, Subscription> = HashMap::new();
        for subscription in report.accept(listed) {
            let billable = matches!(
                subscription.status,
                SubscriptionStatus::Active | SubscriptionStatus::PastDue
            );
            let replace = match subscriptions.get(&subscription.tenant_id) {
                None => true,
                Some(current) => billable && subscription_fee(current, month).is_zero(),
            };
            if replace {
                subscriptions.insert(subscription.tenant_id.clone(), subscription);
            }
        }

        let listed = entities
            .filter::<Commission>(&Query::new().eq("status", CommissionStatus::Settled))
            .await?;
        unreadable.extend(
            listed
                .rejected
                .iter()
                .filter_map(|r| r.field("tenant_id").map(str::to_string)),
        );
        let mut commissions: HashMap<String, Vec<Commission>> = HashMap::new();
        for commission in report.accept(listed) {
            let in_period = commission
                .settlement_month
                .parse::<BillingMonth>()
                .map(|m| m <= month)
                .unwrap_or(false);
            if in_period && commission.invoice_id.is_none() {
                commissions
                    .entry(commission.tenant_id.clone())
                    .or_default()
                    .push(commission);
            }
        }

        let mut issued = 0usize;
        let mut billed = Decimal::ZERO;
        for tenant in &tenants {
            if invoiced.contains(&tenant.id) {
                report.skip(&tenant.id, format!("invoice for {} already exists", month));
                continue;
            }
            if unreadable.contains(&tenant.id) {
                report.skip(&tenant.id, "billing records could not be decoded");
                continue;
            }

            let tenant_commissions = commissions.get(&tenant.id).map(Vec::as_slice).unwrap_or(&[]);
            let result = self
                .invoice_tenant(
                    tenant,
                    month,
                    subscriptions.get(&tenant.id),
                    tenant_commissions,
                    &mut seq,
                    ctx,
                )
                .await;
            if let Ok(ItemResult::Done(_)) = &result {
                issued += 1;
                billed += subscriptions
                    .get(&tenant.id)
                    .map(|s| subscription_fee(s, month))
                    .unwrap_or(Decimal::ZERO)
                    + tenant_commissions.iter().map(|c| c.commission_amount).sum::<Decimal>();
            }
            report.record_result(&tenant.id, result);
        }

        report.set_summary("billing_period", month.to_string());
        report.set_summary("invoices_issued", issued);
        report.set_summary("total_billed", billed.to_string());
        Ok(report)
    }
}
