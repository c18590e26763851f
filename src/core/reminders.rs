use crate::core::job::{BillingServices, ItemResult, Job, JobContext, JobReport};
use crate::domain::model::{Invoice, InvoiceStatus, Tenant};
use crate::domain::policy::ReminderPolicy;
use crate::domain::ports::{EntityStore, Notifier, Query};
use crate::utils::error::{BillingError, Result};
use crate::utils::validation::validate_email;
use chrono::NaiveDate;
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reminder {
    /// Due in the given number of days (0 = today).
    Upcoming(i64),
    /// Past due by the given number of days.
    Overdue(i64),
}

/// Decides whether `invoice` gets a reminder today.
pub fn reminder_due(invoice: &Invoice, policy: &ReminderPolicy, today: NaiveDate) -> Option<Reminder> {
    if invoice.last_reminder_date == Some(today) {
        return None;
    }
    let days_until = (invoice.due_date - today).num_days();
    if days_until >= 0 {
        let scheduled = days_until == 0 || policy.days_before_due.contains(&days_until);
        return (invoice.status == InvoiceStatus::Pending && scheduled)
            .then_some(Reminder::Upcoming(days_until));
    }

    if invoice.overdue_reminder_count >= policy.max_overdue_reminders {
        return None;
    }
    let recently_reminded = invoice
        .last_reminder_date
        .filter(|last| *last > invoice.due_date)
        .is_some_and(|last| (today - last).num_days() < policy.overdue_interval_days);
    (!recently_reminded).then_some(Reminder::Overdue(-days_until))
}

/// Emails owners about invoices coming due and chases overdue ones.
pub struct ReminderJob<S: EntityStore, N: Notifier> {
    services: BillingServices<S, N>,
}

impl<S: EntityStore, N: Notifier> ReminderJob<S, N> {
    pub fn new(services: BillingServices<S, N>) -> Self {
        Self { services }
    }

    async fn process(
        &self,
        invoice: &Invoice,
        tenant: Option<&Tenant>,
        today: NaiveDate,
    ) -> Result<ItemResult> {
        let mut marked = false;
        if invoice.status == InvoiceStatus::Pending && invoice.due_date < today {
            let _: Invoice = self
                .services
                .entities
                .update(&invoice.id, json!({ "status": InvoiceStatus::Overdue }))
                .await?;
            marked = true;
        }

        let Some(reminder) = reminder_due(invoice, &self.services.policy.reminders, today) else {
            return Ok(if marked {
                ItemResult::Done("marked overdue".to_string())
            } else {
                ItemResult::Skipped("no reminder due".to_string())
            });
        };

        if !self.services.policy.notifications.enabled {
            return Ok(if marked {
                ItemResult::Done("marked overdue, notifications disabled".to_string())
            } else {
                ItemResult::Skipped("notifications disabled".to_string())
            });
        }

        let tenant = tenant.ok_or_else(|| BillingError::not_found("Tenant", &invoice.tenant_id))?;
        let to = tenant
            .owner_email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                BillingError::invalid_data(format!("tenant {} has no owner email", tenant.id))
            })?;
        validate_email("owner_email", to)?;

        let (subject, lead) = match reminder {
            Reminder::Upcoming(0) => (
                format!("Invoice {} is due today", invoice.invoice_number),
                "is due today".to_string(),
            ),
            Reminder::Upcoming(days) => (
                format!("Invoice {} is due in {} day(s)", invoice.invoice_number, days),
                format!("is due in {} day(s), on {}", days, invoice.due_date),
            ),
            Reminder::Overdue(days) => (
                format!("[Overdue] Invoice {} is {} day(s) past due", invoice.invoice_number, days),
                format!(
                    "was due on {} and is now {} day(s) overdue. Unpaid invoices lead to \
                     store suspension",
                    invoice.due_date, days
                ),
            ),
        };
        let body = format!(
            "Hello {},\n\nInvoice {} for {} ({} {}) {}.\n\nIf you have already paid, please ignore this message.",
            tenant.name,
            invoice.invoice_number,
            invoice.billing_period,
            invoice.total_amount,
            invoice.currency,
            lead
        );

        if !self.services.send_email(to, subject, body).await? {
            return Ok(ItemResult::Skipped("notifications disabled".to_string()));
        }

        let mut patch = json!({
            "reminder_count": invoice.reminder_count + 1,
            "last_reminder_date": today,
        });
        if let Reminder::Overdue(_) = reminder {
            patch["overdue_reminder_count"] = json!(invoice.overdue_reminder_count + 1);
        }
        let _: Invoice = self.services.entities.update(&invoice.id, patch).await?;

        Ok(ItemResult::Done(match reminder {
            Reminder::Upcoming(days) => format!("reminder sent to {} ({} day(s) to due)", to, days),
            Reminder::Overdue(days) => format!("overdue reminder sent to {} ({} day(s) late)", to, days),
        }))
    }
}

#[async_trait::async_trait]
impl<S, N> Job for ReminderJob<S, N>
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
{
    fn name(&self) -> &'static str {
        "send_billing_reminders"
    }

    async fn run(&self, ctx: &JobContext) -> Result<JobReport> {
        let mut report = JobReport::new(self.name(), ctx);
        let entities = &self.services.entities;

        let listed = entities
            .filter::<Invoice>(&Query::new().eq("status", InvoiceStatus::Pending))
            .await?;
        let mut invoices = report.accept(listed);
        let listed = entities
            .filter::<Invoice>(&Query::new().eq("status", InvoiceStatus::Overdue))
            .await?;
        invoices.extend(report.accept(listed));
        let listed = entities.list::<Tenant>().await?;
        let tenants: HashMap<String, Tenant> = report
            .accept(listed)
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        for invoice in &invoices {
            let result = self
                .process(invoice, tenants.get(&invoice.tenant_id), ctx.run_date)
                .await;
            report.record_result(&invoice.id, result);
        }

        report.set_summary("open_invoices", invoices.len());
        report.set_summary("invoices_updated", report.succeeded);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::*;

    fn find(fx: &Fixture, id: &str) -> Invoice {
        fx.store
            .all::<Invoice>()
            .unwrap()
            .into_iter()
            .find(|i| i.id == id)
            .unwrap()
    }

    #[test]
    fn test_reminder_schedule() {
        let policy = ReminderPolicy::default();
        let due = |d: &str| invoice("i", "t", InvoiceStatus::Pending, "2026-10-01", d);

        assert_eq!(reminder_due(&due("2026-10-26"), &policy, day("2026-10-19")), Some(Reminder::Upcoming(7)));
        assert_eq!(reminder_due(&due("2026-10-19"), &policy, day("2026-10-19")), Some(Reminder::Upcoming(0)));
        assert_eq!(reminder_due(&due("2026-10-24"), &policy, day("2026-10-19")), None);
        assert_eq!(reminder_due(&due("2026-10-18"), &policy, day("2026-10-19")), Some(Reminder::Overdue(1)));

        let mut reminded = due("2026-10-10");
        reminded.last_reminder_date = Some(day("2026-10-17"));
        assert_eq!(reminder_due(&reminded, &policy, day("2026-10-19")), None);
        assert_eq!(reminder_due(&reminded, &policy, day("2026-10-20")), Some(Reminder::Overdue(10)));

        reminded.overdue_reminder_count = 3;
        assert_eq!(reminder_due(&reminded, &policy, day("2026-10-25")), None);
    }

    #[tokio::test]
    async fn test_sends_upcoming_and_overdue_reminders() {
        let fx = Fixture::new();
        fx.store.seed(&[tenant("t1")]).unwrap();
        fx.store
            .seed(&[
                invoice("i1", "t1", InvoiceStatus::Pending, "2026-10-01", "2026-10-22"),
                invoice("i2", "t1", InvoiceStatus::Pending, "2026-09-01", "2026-10-15"),
                invoice("i3", "t1", InvoiceStatus::Paid, "2026-09-01", "2026-10-15"),
                invoice("i4", "t1", InvoiceStatus::Pending, "2026-10-01", "2026-10-30"),
            ])
            .unwrap();

        let job = ReminderJob::new(fx.services());
        let report = job.run(&ctx("2026-10-19")).await.unwrap();

        assert_eq!((report.succeeded, report.skipped, report.failed), (2, 1, 0));
        let upcoming = find(&fx, "i1");
        assert_eq!(upcoming.reminder_count, 1);
        assert_eq!(upcoming.last_reminder_date, Some(day("2026-10-19")));
        let overdue = find(&fx, "i2");
        assert_eq!(overdue.status, InvoiceStatus::Overdue);
        assert_eq!(overdue.overdue_reminder_count, 1);
        assert_eq!(fx.notifier.sent().len(), 2);
        assert!(fx.notifier.sent()[1].subject.starts_with("[Overdue]"));

        // second run on the same day sends nothing
        let again = job.run(&ctx("2026-10-19")).await.unwrap();
        assert_eq!(again.succeeded, 0);
        assert_eq!(fx.notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_email_fails_item_but_marks_overdue() {
        let fx = Fixture::new();
        let mut silent = tenant("t1");
        silent.owner_email = None;
        fx.store.seed(&[silent]).unwrap();
        fx.store
            .seed(&[
                invoice("i1", "t1", InvoiceStatus::Pending, "2026-09-01", "2026-10-15"),
                invoice("i2", "ghost", InvoiceStatus::Pending, "2026-10-01", "2026-10-19"),
            ])
            .unwrap();

        let report = ReminderJob::new(fx.services())
            .run(&ctx("2026-10-19"))
            .await
            .unwrap();

        assert_eq!(report.failed, 2);
        assert!(report.outcome("i1").unwrap().message.contains("owner email"));
        assert!(report.outcome("i2").unwrap().message.contains("ghost"));
        assert_eq!(find(&fx, "i1").status, InvoiceStatus::Overdue);
        assert!(fx.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_notifications_still_mark_overdue() {
        let mut fx = Fixture::new();
        fx.policy.notifications.enabled = false;
        fx.store.seed(&[tenant("t1")]).unwrap();
        fx.store
            .seed(&[
                invoice("i1", "t1", InvoiceStatus::Pending, "2026-09-01", "2026-10-15"),
                invoice("i2", "t1", InvoiceStatus::Pending, "2026-10-01", "2026-10-22"),
            ])
            .unwrap();

        let report = ReminderJob::new(fx.services())
            .run(&ctx("2026-10-19"))
            .await
            .unwrap();

        assert!(fx.notifier.sent().is_empty());
        let late = find(&fx, "i1");
        assert_eq!(late.status, InvoiceStatus::Overdue);
        assert_eq!((late.reminder_count, late.overdue_reminder_count), (0, 0));
        assert_eq!(late.last_reminder_date, None);
        assert_eq!(report.outcome("i1").unwrap().status, crate::core::job::OutcomeStatus::Succeeded);

        let upcoming = find(&fx, "i2");
        assert_eq!(upcoming.reminder_count, 0);
        assert_eq!(report.outcome("i2").unwrap().message, "notifications disabled");
    }

    #[tokio::test]
    async fn test_undecodable_invoice_fails_alone() {
        let fx = Fixture::new();
        fx.store.seed(&[tenant("t1")]).unwrap();
        fx.store
            .seed(&[invoice("i1", "t1", InvoiceStatus::Pending, "2026-10-01", "2026-10-22")])
            .unwrap();
        fx.store
            .seed_raw(
                "Invoice",
                vec![serde_json::json!({"id": "i-bad", "tenant_id": "t1", "status": "pending"})],
            )
            .unwrap();

        let report = ReminderJob::new(fx.services())
            .run(&ctx("2026-10-19"))
            .await
            .unwrap();

        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert_eq!(find(&fx, "i1").reminder_count, 1);
    }
}
