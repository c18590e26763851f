use crate::core::job::{BillingServices, ItemResult, Job, JobContext, JobReport};
use crate::domain::model::{Commission, DailyAnalytics, Order, Tenant, TenantStatus};
use crate::domain::ports::{EntityStore, Notifier, Query};
use crate::utils::error::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

fn on_day(ts: Option<DateTime<Utc>>, day: NaiveDate) -> bool {
    ts.is_some_and(|ts| ts.date_naive() == day)
}

fn empty_row(date: NaiveDate, tenant_id: Option<String>) -> DailyAnalytics {
    DailyAnalytics {
        id: String::new(),
        date,
        tenant_id,
        order_count: 0,
        gross_revenue: Decimal::ZERO,
        commission_total: Decimal::ZERO,
        cancelled_count: 0,
        active_tenants: None,
        new_tenants: None,
    }
}

/// Builds per-tenant rows plus the platform-wide row (`tenant_id: None`)
/// for `day`. Tenant rows come out in id order, the platform row last.
pub fn aggregate_day(
    day: NaiveDate,
    orders: &[Order],
    commissions: &[Commission],
    tenants: &[Tenant],
) -> Vec<DailyAnalytics> {
    let mut per_tenant: BTreeMap<String, DailyAnalytics> = BTreeMap::new();
    let mut platform = empty_row(day, None);

    for order in orders.iter().filter(|o| on_day(o.created_date, day)) {
        let row = per_tenant
            .entry(order.tenant_id.clone())
            .or_insert_with(|| empty_row(day, Some(order.tenant_id.clone())));
        for row in [row, &mut platform] {
            if order.status.is_void() {
                row.cancelled_count += 1;
            } else {
                row.order_count += 1;
                row.gross_revenue += order.total_amount;
            }
        }
    }

    for commission in commissions.iter().filter(|c| on_day(c.created_date, day)) {
        let row = per_tenant
            .entry(commission.tenant_id.clone())
            .or_insert_with(|| empty_row(day, Some(commission.tenant_id.clone())));
        row.commission_total += commission.commission_amount;
        platform.commission_total += commission.commission_amount;
    }

    let count = |pred: &dyn Fn(&Tenant) -> bool| {
        u32::try_from(tenants.iter().filter(|t| pred(t)).count()).unwrap_or(u32::MAX)
    };
    platform.active_tenants = Some(count(&|t| t.status == TenantStatus::Active));
    platform.new_tenants = Some(count(&|t| on_day(t.created_date, day)));

    let mut rows: Vec<DailyAnalytics> = per_tenant.into_values().collect();
    rows.push(platform);
    rows
}

/// Rolls up the previous day's orders and commissions into DailyAnalytics.
pub struct AnalyticsJob<S: EntityStore, N: Notifier> {
    services: BillingServices<S, N>,
}

impl<S: EntityStore, N: Notifier> AnalyticsJob<S, N> {
    pub fn new(services: BillingServices<S, N>) -> Self {
        Self { services }
    }

    async fn upsert(
        &self,
        row: &DailyAnalytics,
        existing: Option<&String>,
    ) -> Result<ItemResult> {
        let entities = &self.services.entities;
        match existing {
            Some(current_id) => {
                let mut patch = serde_json::to_value(row)?;
                if let Some(fields) = patch.as_object_mut() {
                    fields.remove("id");
                }
                let _: DailyAnalytics = entities.update(current_id, patch).await?;
                Ok(ItemResult::Done(format!(
                    "updated {}: {} orders, {} revenue",
                    current_id, row.order_count, row.gross_revenue
                )))
            }
            None => {
                let created = entities.create(row).await?;
                Ok(ItemResult::Done(format!(
                    "created {}: {} orders, {} revenue",
                    created.id, row.order_count, row.gross_revenue
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl<S, N> Job for AnalyticsJob<S, N>
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
{
    fn name(&self) -> &'static str {
        "aggregate_analytics"
    }

    async fn run(&self, ctx: &JobContext) -> Result<JobReport> {
        let target = ctx
            .target_day
            .unwrap_or(ctx.run_date - Duration::days(1));
        let mut report = JobReport::new(self.name(), ctx);
        let entities = &self.services.entities;
        tracing::info!("Aggregating analytics for {}", target);

        let listed = entities.list::<Order>().await?;
        let orders = report.accept(listed);
        let listed = entities.list::<Commission>().await?;
        let commissions = report.accept(listed);
        let listed = entities.list::<Tenant>().await?;
        let tenants = report.accept(listed);

        // malformed rows are still keyed so the upsert overwrites them
        let listed = entities
            .filter::<DailyAnalytics>(&Query::new().eq("date", target.to_string()))
            .await?;
        let existing: HashMap<Option<String>, String> = listed
            .rejected
            .iter()
            .map(|r| (r.field("tenant_id").map(str::to_string), r.id.clone()))
            .chain(
                listed
                    .records
                    .iter()
                    .map(|row| (row.tenant_id.clone(), row.id.clone())),
            )
            .collect();
        report.accept(listed);

        let rows = aggregate_day(target, &orders, &commissions, &tenants);
        for row in &rows {
            let key = row.tenant_id.as_deref().unwrap_or("platform");
            let result = self.upsert(row, existing.get(&row.tenant_id)).await;
            report.record_result(key, result);
        }

        if let Some(platform) = rows.last() {
            report.set_summary("date", target.to_string());
            report.set_summary("order_count", platform.order_count);
            report.set_summary("gross_revenue", platform.gross_revenue.to_string());
            report.set_summary("commission_total", platform.commission_total.to_string());
        }
        Ok(report)
    }
}
