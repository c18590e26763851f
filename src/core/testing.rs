//! Builders shared by the job tests.

use crate::adapters::memory::{MemoryNotifier, MemoryStore};
use crate::core::job::{BillingServices, JobContext};
use crate::domain::model::*;
use crate::domain::policy::BillingPolicy;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<MemoryNotifier>,
    pub policy: BillingPolicy,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            notifier: Arc::new(MemoryNotifier::new()),
            policy: BillingPolicy::default(),
        }
    }

    pub fn services(&self) -> BillingServices<MemoryStore, MemoryNotifier> {
        BillingServices::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            self.policy.clone(),
        )
    }
}

pub fn day(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

pub fn ctx(run_date: &str) -> JobContext {
    JobContext::new(day(run_date))
}

pub fn won(amount: i64) -> Decimal {
    Decimal::new(amount, 0)
}

pub fn tenant(id: &str) -> Tenant {
    Tenant {
        id: id.to_string(),
        name: format!("Farm {}", id),
        owner_email: Some(format!("{}@farm.example.com", id)),
        status: TenantStatus::Active,
        commission_rate: None,
        subscription_plan: Some("basic".to_string()),
        suspended_at: None,
        suspension_reason: None,
        created_date: lenient_timestamp::parse("2026-01-01T00:00:00Z"),
    }
}

pub fn order(id: &str, tenant_id: &str, total: i64, status: OrderStatus, created: &str) -> Order {
    Order {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        order_number: Some(format!("ZF-{}", id)),
        total_amount: won(total),
        status,
        commission_calculated: false,
        commission_amount: None,
        created_date: lenient_timestamp::parse(created),
    }
}

pub fn commission(id: &str, tenant_id: &str, amount: i64, status: CommissionStatus, month: &str) -> Commission {
    Commission {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        order_id: format!("order-of-{}", id),
        order_amount: won(amount * 100 / 3),
        commission_rate: won(3),
        commission_amount: won(amount),
        status,
        settlement_month: month.to_string(),
        settled_date: None,
        invoice_id: None,
        created_date: None,
    }
}

pub fn subscription(id: &str, tenant_id: &str, fee: i64, status: SubscriptionStatus) -> Subscription {
    Subscription {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        plan_name: "basic".to_string(),
        monthly_fee: won(fee),
        billing_cycle: BillingCycle::Monthly,
        status,
        auto_renew: true,
        current_period_start: None,
        next_billing_date: None,
        past_due_since: None,
        trial_end_date: None,
        renewal_count: 0,
    }
}

pub fn invoice(id: &str, tenant_id: &str, status: InvoiceStatus, issued: &str, due: &str) -> Invoice {
    Invoice {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        invoice_number: format!("INV-{}", id),
        billing_period: "2026-09".to_string(),
        subscription_fee: won(29000),
        commission_total: won(3000),
        total_amount: won(32000),
        currency: "KRW".to_string(),
        status,
        issue_date: day(issued),
        due_date: day(due),
        reminder_count: 0,
        overdue_reminder_count: 0,
        last_reminder_date: None,
        paid_date: None,
    }
}
