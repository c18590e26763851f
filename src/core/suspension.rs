use crate::core::job::{BillingServices, ItemResult, Job, JobContext, JobReport};
use crate::domain::model::{
    Invoice, InvoiceStatus, Subscription, SubscriptionStatus, Tenant, TenantStatus,
};
use crate::domain::ports::{EntityStore, Notifier, Query};
use crate::utils::error::Result;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;
use std::collections::HashMap;

/// Why a tenant is being suspended, if at all.
pub fn suspension_reason(
    subscriptions: &[&Subscription],
    overdue: &[&Invoice],
    overdue_days: i64,
    today: NaiveDate,
) -> Option<String> {
    if let Some(sub) = subscriptions.iter().find(|s| {
        matches!(
            s.status,
            SubscriptionStatus::Suspended | SubscriptionStatus::Expired
        )
    }) {
        return Some(format!("subscription {} is {}", sub.plan_name, sub.status));
    }
    overdue
        .iter()
        .filter(|i| i.due_date + Duration::days(overdue_days) <= today)
        .min_by_key(|i| i.due_date)
        .map(|i| {
            format!(
                "invoice {} unpaid since {} ({} days)",
                i.invoice_number,
                i.due_date,
                (today - i.due_date).num_days()
            )
        })
}

/// Suspends active stores whose subscription lapsed or whose invoices stay
/// unpaid past the tolerance.
pub struct SuspensionJob<S: EntityStore, N: Notifier> {
    services: BillingServices<S, N>,
}

impl<S: EntityStore, N: Notifier> SuspensionJob<S, N> {
    pub fn new(services: BillingServices<S, N>) -> Self {
        Self { services }
    }

    async fn suspend(&self, tenant: &Tenant, reason: String) -> Result<ItemResult> {
        let _: Tenant = self
            .services
            .entities
            .update(
                &tenant.id,
                json!({
                    "status": TenantStatus::Suspended,
                    "suspended_at": Utc::now().to_rfc3339(),
                    "suspension_reason": reason,
                }),
            )
            .await?;

        self.services
            .notify(
                tenant.owner_email.as_deref(),
                format!("[{}] Your store has been suspended", tenant.name),
                format!(
                    "Hello {},\n\nYour store has been suspended: {}.\n\
                     Settle the outstanding balance to have it reactivated.",
                    tenant.name, reason
                ),
            )
            .await;
        Ok(ItemResult::Done(format!("suspended: {}", reason)))
    }
}

#[async_trait::async_trait]
impl<S, N> Job for SuspensionJob<S, N>
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
{
    fn name(&self) -> &'static str {
        "suspend_expired_tenants"
    }

    async fn run(&self, ctx: &JobContext) -> Result<JobReport> {
        let mut report = JobReport::new(self.name(), ctx);
        let entities = &self.services.entities;

        let listed = entities
            .filter::<Tenant>(&Query::new().eq("status", TenantStatus::Active))
            .await?;
        let tenants = report.accept(listed);
        // a record that cannot be read never adds a suspension reason
        let listed = entities.list::<Subscription>().await?;
        let subscriptions = report.accept(listed);
        let listed = entities
            .filter::<Invoice>(&Query::new().eq("status", InvoiceStatus::Overdue))
            .await?;
        let overdue = report.accept(listed);

        let mut subs_by_tenant: HashMap<&str, Vec<&Subscription>> = HashMap::new();
        for sub in &subscriptions {
            subs_by_tenant.entry(sub.tenant_id.as_str()).or_default().push(sub);
        }
        let mut overdue_by_tenant: HashMap<&str, Vec<&Invoice>> = HashMap::new();
        for invoice in &overdue {
            overdue_by_tenant
                .entry(invoice.tenant_id.as_str())
                .or_default()
                .push(invoice);
        }

        let mut suspended = 0usize;
        for tenant in &tenants {
            let reason = suspension_reason(
                subs_by_tenant.get(tenant.id.as_str()).map(Vec::as_slice).unwrap_or(&[]),
                overdue_by_tenant.get(tenant.id.as_str()).map(Vec::as_slice).unwrap_or(&[]),
                self.services.policy.suspension.overdue_days,
                ctx.run_date,
            );
            let result = match reason {
                Some(reason) => self.suspend(tenant, reason).await,
                None => Ok(ItemResult::Skipped("in good standing".to_string())),
            };
            if let Ok(ItemResult::Done(_)) = &result {
                suspended += 1;
            }
            report.record_result(&tenant.id, result);
        }

        report.set_summary("active_tenants", tenants.len());
        report.set_summary("suspended", suspended);
        Ok(report)
    }
}
