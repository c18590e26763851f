use crate::core::job::{BillingServices, ItemResult, Job, JobContext, JobReport};
use crate::domain::model::{Commission, CommissionStatus, Order, Tenant};
use crate::domain::period::BillingMonth;
use crate::domain::ports::{EntityStore, Notifier, Query};
use crate::utils::error::Result;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;
use std::collections::HashMap;

/// `total * rate%`, rounded half away from zero to `scale` decimals.
pub fn commission_amount(total: Decimal, rate_percent: Decimal, scale: u32) -> Decimal {
    (total * rate_percent / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Records the platform commission for orders that have not been charged yet.
pub struct CommissionJob<S: EntityStore, N: Notifier> {
    services: BillingServices<S, N>,
}

impl<S: EntityStore, N: Notifier> CommissionJob<S, N> {
    pub fn new(services: BillingServices<S, N>) -> Self {
        Self { services }
    }

    async fn tenant(&self, cache: &mut HashMap<String, Tenant>, tenant_id: &str) -> Result<Tenant> {
        if let Some(tenant) = cache.get(tenant_id) {
            return Ok(tenant.clone());
        }
        let tenant: Tenant = self.services.entities.get(tenant_id).await?;
        cache.insert(tenant_id.to_string(), tenant.clone());
        Ok(tenant)
    }

    async fn process_order(
        &self,
        order: &Order,
        ctx: &JobContext,
        tenants: &mut HashMap<String, Tenant>,
        total: &mut Decimal,
    ) -> Result<ItemResult> {
        let policy = &self.services.policy.commission;

        if order.commission_calculated {
            return Ok(ItemResult::Skipped("commission already calculated".to_string()));
        }
        if !policy.eligible_statuses.contains(&order.status) {
            return Ok(ItemResult::Skipped(format!(
                "order status '{}' is not billable",
                order.status
            )));
        }

        let tenant = self.tenant(tenants, &order.tenant_id).await?;
        let rate = tenant.commission_rate.unwrap_or(policy.default_rate);
        let amount = commission_amount(order.total_amount, rate, policy.amount_scale);

        let existing: Vec<Commission> = self
            .services
            .entities
            .filter(&Query::new().eq("order_id", order.id.as_str()))
            .await?
            .into_strict()?;

        let message = if let Some(commission) = existing.first() {
            // created by an earlier run that died before flagging the order
            format!(
                "commission {} already recorded, order flag repaired",
                commission.id
            )
        } else {
            let order_day = order
                .created_date
                .map(|dt| dt.date_naive())
                .unwrap_or(ctx.run_date);

            let commission = Commission {
                id: String::new(),
                tenant_id: order.tenant_id.clone(),
                order_id: order.id.clone(),
                order_amount: order.total_amount,
                commission_rate: rate,
                commission_amount: amount,
                status: CommissionStatus::Pending,
                settlement_month: BillingMonth::of(order_day).to_string(),
                settled_date: None,
                invoice_id: None,
                created_date: Some(chrono::Utc::now()),
            };
            let created = self.services.entities.create(&commission).await?;
            *total += amount;
            format!(
                "commission {} created: {} x {}% = {}",
                created.id, order.total_amount, rate, amount
            )
        };

        let patch = json!({
            "commission_calculated": true,
            "commission_amount": existing.first().map(|c| c.commission_amount).unwrap_or(amount),
        });
        let _: Order = self.services.entities.update(&order.id, patch).await?;

        Ok(ItemResult::Done(message))
    }
}

#[async_trait::async_trait]
impl<S, N> Job for CommissionJob<S, N>
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
{
    fn name(&self) -> &'static str {
        "calculate_order_commission"
    }

    async fn run(&self, ctx: &JobContext) -> Result<JobReport> {
        let mut report = JobReport::new(self.name(), ctx);

        let orders: Vec<Order> = match &ctx.order_id {
            // a missing explicit order aborts the job
            Some(order_id) => vec![self.services.entities.get(order_id).await?],
            None => {
                let listed = self.services.entities.list::<Order>().await?;
                report
                    .accept(listed)
                    .into_iter()
                    .filter(|o| !o.commission_calculated)
                    .collect()
            }
        };
        tracing::info!("Found {} order(s) to check", orders.len());

        let mut tenants = HashMap::new();
        let mut total = Decimal::ZERO;
        for order in &orders {
            let result = self.process_order(order, ctx, &mut tenants, &mut total).await;
            report.record_result(&order.id, result);
        }

        report.set_summary("orders_checked", orders.len());
        report.set_summary("total_commission", total.to_string());
        Ok(report)
    }
}
