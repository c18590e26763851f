use multishop_billing::adapters::{DryRunStore, MemoryNotifier, MemoryStore};
use multishop_billing::app::{run_kind, JobKind};
use multishop_billing::domain::model::{
    Commission, CommissionSettlement, CommissionStatus, DailyAnalytics, Invoice, Order,
    Subscription,
};
use multishop_billing::domain::policy::BillingPolicy;
use multishop_billing::{BillingServices, JobContext, JobEngine, LocalStorage};
use chrono::NaiveDate;
use serde_json::json;
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .seed_raw(
            "Tenant",
            vec![
                json!({"id": "t1", "name": "Green Valley", "owner_email": "gv@farm.example.com", "status": "active"}),
                json!({"id": "t2", "name": "Sunny Orchard", "owner_email": "so@farm.example.com", "status": "active", "commission_rate": 3}),
            ],
        )
        .unwrap();
    store
        .seed_raw(
            "Order",
            vec![
                json!({"id": "o1", "tenant_id": "t1", "total_amount": 100000, "status": "delivered", "created_date": "2026-09-20T08:00:00Z"}),
                json!({"id": "o2", "tenant_id": "t2", "total_amount": 50000, "status": "paid", "created_date": "2026-09-30T10:00:00Z"}),
                json!({"id": "o3", "tenant_id": "t2", "total_amount": 20000, "status": "paid", "created_date": "2026-09-30T12:00:00Z"}),
                json!({"id": "o4", "tenant_id": "t2", "total_amount": 9000, "status": "cancelled", "created_date": "2026-09-30T13:00:00Z"}),
            ],
        )
        .unwrap();
    store
        .seed_raw(
            "Subscription",
            vec![
                json!({"id": "s1", "tenant_id": "t1", "plan_name": "basic", "monthly_fee": 29000, "status": "active",
                       "current_period_start": "2026-09-01", "next_billing_date": "2026-10-01"}),
                json!({"id": "s2", "tenant_id": "t2", "plan_name": "basic", "monthly_fee": 29000, "status": "trial",
                       "trial_end_date": "2026-10-15"}),
            ],
        )
        .unwrap();
    store
}

fn billing_day() -> JobContext {
    JobContext::new(NaiveDate::from_ymd_opt(2026, 10, 1).unwrap())
}

#[tokio::test]
async fn test_daily_run_on_billing_day() {
    let store = Arc::new(seeded_store());
    let notifier = Arc::new(MemoryNotifier::new());
    let services = BillingServices::new(store.clone(), notifier.clone(), BillingPolicy::default());
    let engine: JobEngine<LocalStorage> = JobEngine::new();

    let reports = run_kind(JobKind::RunDaily, &services, &engine, &billing_day())
        .await
        .unwrap();

    assert_eq!(reports.len(), 7);
    assert!(reports.iter().all(|r| r.success()), "{:#?}", reports);

    let commissions: Vec<Commission> = store.all().unwrap();
    assert_eq!(commissions.len(), 3);
    assert!(commissions.iter().all(|c| c.status == CommissionStatus::Invoiced));
    assert!(store.all::<Order>().unwrap().iter().filter(|o| o.commission_calculated).count() == 3);

    let settlements: Vec<CommissionSettlement> = store.all().unwrap();
    assert_eq!(settlements.len(), 2);

    let invoices: Vec<Invoice> = store.all().unwrap();
    assert_eq!(invoices.len(), 2);
    let t1 = invoices.iter().find(|i| i.tenant_id == "t1").unwrap();
    assert_eq!(t1.total_amount.to_string(), "32000");
    assert_eq!(t1.billing_period, "2026-09");
    let t2 = invoices.iter().find(|i| i.tenant_id == "t2").unwrap();
    assert_eq!(t2.total_amount.to_string(), "2100");

    let s1 = store
        .all::<Subscription>()
        .unwrap()
        .into_iter()
        .find(|s| s.id == "s1")
        .unwrap();
    assert_eq!(s1.next_billing_date, NaiveDate::from_ymd_opt(2026, 11, 1));
    assert_eq!(s1.renewal_count, 1);

    let analytics: Vec<DailyAnalytics> = store.all().unwrap();
    let platform = analytics.iter().find(|a| a.tenant_id.is_none()).unwrap();
    assert_eq!(platform.order_count, 2);
    assert_eq!(platform.cancelled_count, 1);
    assert_eq!(platform.gross_revenue.to_string(), "70000");

    // two invoices and one renewal notice
    assert_eq!(notifier.sent().len(), 3);
}

#[tokio::test]
async fn test_second_run_same_day_changes_nothing() {
    let store = Arc::new(seeded_store());
    let notifier = Arc::new(MemoryNotifier::new());
    let services = BillingServices::new(store.clone(), notifier.clone(), BillingPolicy::default());
    let engine: JobEngine<LocalStorage> = JobEngine::new();

    run_kind(JobKind::RunDaily, &services, &engine, &billing_day())
        .await
        .unwrap();
    let before = (
        store.records("Commission").len(),
        store.records("CommissionSettlement").len(),
        store.records("Invoice").len(),
        store.records("DailyAnalytics").len(),
        notifier.sent().len(),
    );

    let reports = run_kind(JobKind::RunDaily, &services, &engine, &billing_day())
        .await
        .unwrap();

    let after = (
        store.records("Commission").len(),
        store.records("CommissionSettlement").len(),
        store.records("Invoice").len(),
        store.records("DailyAnalytics").len(),
        notifier.sent().len(),
    );
    assert_eq!(before, after);
    let invoicing = reports
        .iter()
        .find(|r| r.job == "generate_monthly_invoices")
        .unwrap();
    assert_eq!(invoicing.succeeded, 0);
    assert_eq!(invoicing.skipped, 2);
}

#[tokio::test]
async fn test_dry_run_leaves_store_untouched_and_archives_reports() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(DryRunStore::new(seeded_store()));
    let services = BillingServices::new(
        store.clone(),
        Arc::new(MemoryNotifier::new()),
        BillingPolicy::default(),
    );
    let engine = JobEngine::new().with_archive(
        LocalStorage::new(dir.path().to_str().unwrap().to_string()),
        "reports",
    );
    let ctx = billing_day().with_dry_run(true);

    let reports = run_kind(JobKind::CalculateCommission, &services, &engine, &ctx)
        .await
        .unwrap();

    assert_eq!(reports[0].succeeded, 3);
    assert!(store.planned_writes() >= 6);

    let archive = dir
        .path()
        .join("reports/calculate_order_commission-2026-10-01-dry-run.zip");
    assert!(archive.exists());

    let mut zip = zip::ZipArchive::new(std::fs::File::open(archive).unwrap()).unwrap();
    let mut report_json = String::new();
    zip.by_name("report.json")
        .unwrap()
        .read_to_string(&mut report_json)
        .unwrap();
    let report: serde_json::Value = serde_json::from_str(&report_json).unwrap();
    assert_eq!(report["job"], "calculate_order_commission");
    assert_eq!(report["dry_run"], true);

    let mut csv = String::new();
    zip.by_name("outcomes.csv")
        .unwrap()
        .read_to_string(&mut csv)
        .unwrap();
    assert!(csv.starts_with("entity_id,status,message"));
    assert!(csv.contains("o1,succeeded"));
}
