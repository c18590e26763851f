use crate::core::job::{BillingServices, ItemResult, Job, JobContext, JobReport};
use crate::domain::model::{
    Commission, CommissionSettlement, CommissionStatus, SettlementStatus,
};
use crate::domain::period::BillingMonth;
use crate::domain::ports::{EntityStore, Notifier, Query};
use crate::utils::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};

/// Settles every pending commission up to the target month, one settlement
/// record per tenant.
pub struct SettlementJob<S: EntityStore, N: Notifier> {
    services: BillingServices<S, N>,
    billing_day_only: bool,
}

impl<S: EntityStore, N: Notifier> SettlementJob<S, N> {
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

    async fn settle_tenant(
        &self,
        tenant_id: &str,
        month: BillingMonth,
        commissions: &[Commission],
        ctx: &JobContext,
    ) -> Result<(ItemResult, Decimal)> {
        let total_order_amount: Decimal = commissions.iter().map(|c| c.order_amount).sum();
        let total_commission: Decimal = commissions.iter().map(|c| c.commission_amount).sum();

        let settlement = CommissionSettlement {
            id: String::new(),
            tenant_id: tenant_id.to_string(),
            settlement_month: month.to_string(),
            commission_count: u32::try_from(commissions.len()).map_err(|_| {
                BillingError::invalid_data(format!("too many commissions for tenant {}", tenant_id))
            })?,
            total_order_amount,
            total_commission,
            status: SettlementStatus::Completed,
            settled_date: ctx.run_date,
        };
        let created = self.services.entities.create(&settlement).await?;

        let mut failures = Vec::new();
        for commission in commissions {
            let patch = json!({
                "status": CommissionStatus::Settled,
                "settled_date": ctx.run_date,
            });
            if let Err(e) = self
                .services
                .entities
                .update::<Commission>(&commission.id, patch)
                .await
            {
                tracing::error!("❌ Commission {} not marked settled: {}", commission.id, e);
                failures.push(commission.id.clone());
            }
        }

        if !failures.is_empty() {
            return Err(BillingError::JobError {
                job: "settlement".to_string(),
                message: format!(
                    "settlement {} created but commissions {} are still pending; review before the next run",
                    created.id,
                    failures.join(", ")
                ),
            });
        }

        Ok((
            ItemResult::Done(format!(
                "settlement {}: {} commissions, {} on {} of orders",
                created.id,
                commissions.len(),
                total_commission,
                total_order_amount
            )),
            total_commission,
        ))
    }
}

#[async_trait::async_trait]
impl<S, N> Job for SettlementJob<S, N>
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
{
    fn name(&self) -> &'static str {
        "process_monthly_commission_settlement"
    }

    fn should_run(&self, ctx: &JobContext) -> bool {
        !self.billing_day_only
            || chrono::Datelike::day(&ctx.run_date) == self.services.policy.invoice.billing_day
    }

    async fn run(&self, ctx: &JobContext) -> Result<JobReport> {
        let month = ctx.billing_month();
        let mut report = JobReport::new(self.name(), ctx);
        tracing::info!("Settling commissions up to {}", month);

        let listed = self
            .services
            .entities
            .filter::<Commission>(&Query::new().eq("status", CommissionStatus::Pending))
            .await?;
        let pending = report.accept(listed);

        let mut by_tenant: BTreeMap<String, Vec<Commission>> = BTreeMap::new();
        for commission in pending {
            match commission.settlement_month.parse::<BillingMonth>() {
                Ok(m) if m <= month => by_tenant
                    .entry(commission.tenant_id.clone())
                    .or_default()
                    .push(commission),
                Ok(_) => {}
                Err(e) => report.fail(&commission.id, &e),
            }
        }

        let existing = self
            .services
            .entities
            .filter::<CommissionSettlement>(&Query::new().eq("settlement_month", month.to_string()))
            .await?;
        // an unreadable settlement still blocks its tenant
        let already_settled: HashSet<String> = existing
            .rejected
            .iter()
            .filter_map(|r| r.field("tenant_id").map(str::to_string))
            .chain(existing.records.iter().map(|s| s.tenant_id.clone()))
            .collect();
        report.accept(existing);

        let mut grand_total = Decimal::ZERO;
        for (tenant_id, commissions) in &by_tenant {
            if already_settled.contains(tenant_id) {
                tracing::warn!(
                    "Tenant {} already settled for {}; {} pending commission(s) roll into the next settlement",
                    tenant_id,
                    month,
                    commissions.len()
                );
                report.skip(tenant_id, format!("already settled for {}", month));
                continue;
            }

            let result = self
                .settle_tenant(tenant_id, month, commissions, ctx)
                .await
                .map(|(outcome, total)| {
                    grand_total += total;
                    outcome
                });
            report.record_result(tenant_id, result);
        }

        report.set_summary("settlement_month", month.to_string());
        report.set_summary("tenants", by_tenant.len());
        report.set_summary("total_commission", grand_total.to_string());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::*;

    #[tokio::test]
    async fn test_settles_pending_commissions_per_tenant() {
        let fx = Fixture::new();
        fx.store
            .seed(&[
                commission("c1", "t1", 3000, CommissionStatus::Pending, "2026-09"),
                commission("c2", "t1", 1500, CommissionStatus::Pending, "2026-08"),
                commission("c3", "t2", 600, CommissionStatus::Pending, "2026-09"),
                commission("c4", "t2", 900, CommissionStatus::Pending, "2026-10"),
                commission("c5", "t2", 900, CommissionStatus::Settled, "2026-09"),
            ])
            .unwrap();

        let report = SettlementJob::new(fx.services())
            .run(&ctx("2026-10-01"))
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.summary["total_commission"], "5100");

        let settlements: Vec<CommissionSettlement> = fx.store.all().unwrap();
        let t1 = settlements.iter().find(|s| s.tenant_id == "t1").unwrap();
        assert_eq!(t1.commission_count, 2);
        assert_eq!(t1.total_commission, won(4500));
        assert_eq!(t1.settlement_month, "2026-09");

        let commissions: Vec<Commission> = fx.store.all().unwrap();
        let status = |id: &str| commissions.iter().find(|c| c.id == id).unwrap().status;
        assert_eq!(status("c1"), CommissionStatus::Settled);
        assert_eq!(status("c2"), CommissionStatus::Settled);
        assert_eq!(status("c4"), CommissionStatus::Pending);
        let c1 = commissions.iter().find(|c| c.id == "c1").unwrap();
        assert_eq!(c1.settled_date, Some(day("2026-10-01")));
    }

    #[tokio::test]
    async fn test_rerun_skips_settled_tenants() {
        let fx = Fixture::new();
        fx.store
            .seed(&[commission("c1", "t1", 3000, CommissionStatus::Pending, "2026-09")])
            .unwrap();
        let job = SettlementJob::new(fx.services());
        job.run(&ctx("2026-10-01")).await.unwrap();

        // a late commission for the same month arrives after settlement
        fx.store
            .seed(&[commission("c2", "t1", 700, CommissionStatus::Pending, "2026-09")])
            .unwrap();
        let report = job.run(&ctx("2026-10-01")).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(fx.store.all::<CommissionSettlement>().unwrap().len(), 1);

        // and is picked up by the following month's run
        let next = job.run(&ctx("2026-11-01")).await.unwrap();
        assert_eq!(next.succeeded, 1);
    }

    #[tokio::test]
    async fn test_failed_commission_update_fails_tenant() {
        let fx = Fixture::new();
        fx.store
            .seed(&[
                commission("c1", "t1", 3000, CommissionStatus::Pending, "2026-09"),
                commission("c2", "t2", 3000, CommissionStatus::Pending, "2026-09"),
            ])
            .unwrap();
        fx.store.fail_writes_for("c1");

        let report = SettlementJob::new(fx.services())
            .run(&ctx("2026-10-01"))
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert!(report.outcome("t1").unwrap().message.contains("c1"));
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_undecodable_commission_fails_alone() {
        let fx = Fixture::new();
        fx.store
            .seed(&[commission("c1", "t1", 3000, CommissionStatus::Pending, "2026-09")])
            .unwrap();
        fx.store
            .seed_raw(
                "Commission",
                vec![serde_json::json!({"id": "c-bad", "tenant_id": "t1", "status": "pending"})],
            )
            .unwrap();

        let report = SettlementJob::new(fx.services())
            .run(&ctx("2026-10-01"))
            .await
            .unwrap();

        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert_eq!(report.outcome("c-bad").unwrap().status, crate::core::job::OutcomeStatus::Failed);
        assert_eq!(report.summary["total_commission"], "3000");
    }

    #[test]
    fn test_billing_day_gate() {
        let fx = Fixture::new();
        let job = SettlementJob::new(fx.services()).on_billing_day_only();
        assert!(job.should_run(&ctx("2026-10-01")));
        assert!(!job.should_run(&ctx("2026-10-02")));
    }
}
