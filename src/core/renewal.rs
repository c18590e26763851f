use crate::core::job::{BillingServices, ItemResult, Job, JobContext, JobReport};
use crate::domain::model::{
    Invoice, InvoiceStatus, Subscription, SubscriptionStatus, Tenant,
};
use crate::domain::period::add_months;
use crate::domain::ports::{EntityStore, Notifier, Query};
use crate::utils::error::Result;
use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Rolls `start` forward by whole cycles until the next billing date lies
/// after `today`. Returns the new period start, next billing date and the
/// number of cycles advanced.
pub fn advance_period(start: NaiveDate, cycle_months: u32, today: NaiveDate) -> (NaiveDate, NaiveDate, u32) {
    let mut period_start = start;
    let mut next = add_months(period_start, cycle_months);
    let mut cycles = 1;
    while next <= today && next != NaiveDate::MAX {
        period_start = next;
        next = add_months(period_start, cycle_months);
        cycles += 1;
    }
    (period_start, next, cycles)
}

/// Moves subscriptions through trial, renewal, past-due and expiry.
pub struct RenewalJob<S: EntityStore, N: Notifier> {
    services: BillingServices<S, N>,
}

struct Transition {
    patch: Value,
    message: String,
    email: Option<(String, String)>,
}

impl<S: EntityStore, N: Notifier> RenewalJob<S, N> {
    pub fn new(services: BillingServices<S, N>) -> Self {
        Self { services }
    }

    fn plan(
        &self,
        sub: &Subscription,
        overdue: bool,
        today: NaiveDate,
    ) -> std::result::Result<Transition, String> {
        let months = sub.billing_cycle.months();
        match sub.status {
            SubscriptionStatus::Trial => {
                let Some(trial_end) = sub.trial_end_date else {
                    return Err("trial has no end date".to_string());
                };
                if trial_end > today {
                    return Err(format!("trial runs until {}", trial_end));
                }
                let next = add_months(trial_end, months);
                Ok(Transition {
                    patch: json!({
                        "status": SubscriptionStatus::Active,
                        "current_period_start": trial_end,
                        "next_billing_date": next,
                    }),
                    message: format!("trial ended, active until {}", next),
                    email: Some((
                        format!("Your {} trial has ended", sub.plan_name),
                        format!(
                            "Your free trial ended on {}. The {} plan is now active and \
                             the next billing date is {}.",
                            trial_end, sub.plan_name, next
                        ),
                    )),
                })
            }
            SubscriptionStatus::Active => {
                let Some(due) = sub.next_billing_date else {
                    return Err("no next billing date".to_string());
                };
                if due > today {
                    return Err(format!("not due until {}", due));
                }
                if overdue {
                    return Ok(Transition {
                        patch: json!({
                            "status": SubscriptionStatus::PastDue,
                            "past_due_since": today,
                        }),
                        message: "unpaid invoice, marked past due".to_string(),
                        email: Some((
                            "Payment overdue for your subscription".to_string(),
                            format!(
                                "We could not renew your {} plan because an invoice is overdue. \
                                 Please pay within {} days to avoid suspension.",
                                sub.plan_name, self.services.policy.subscription.grace_period_days
                            ),
                        )),
                    });
                }
                if !sub.auto_renew {
                    return Ok(Transition {
                        patch: json!({ "status": SubscriptionStatus::Expired }),
                        message: format!("expired on {}", due),
                        email: Some((
                            format!("Your {} plan has expired", sub.plan_name),
                            format!(
                                "Your {} plan ended on {} and auto-renew is off.",
                                sub.plan_name, due
                            ),
                        )),
                    });
                }
                let (start, next, cycles) = advance_period(due, months, today);
                Ok(Transition {
                    patch: json!({
                        "current_period_start": start,
                        "next_billing_date": next,
                        "renewal_count": sub.renewal_count + cycles,
                    }),
                    message: format!("renewed until {}", next),
                    email: Some((
                        format!("Your {} plan was renewed", sub.plan_name),
                        format!(
                            "Your {} plan was renewed. Current period: {} to {}.",
                            sub.plan_name, start, next
                        ),
                    )),
                })
            }
            SubscriptionStatus::PastDue => {
                if !overdue {
                    return Ok(Transition {
                        patch: json!({
                            "status": SubscriptionStatus::Active,
                            "past_due_since": Value::Null,
                        }),
                        message: "overdue invoices paid, reactivated".to_string(),
                        email: None,
                    });
                }
                let Some(since) = sub.past_due_since else {
                    // grace counts from the first run that sees the subscription
                    return Ok(Transition {
                        patch: json!({ "past_due_since": today }),
                        message: format!(
                            "past due without a start date, grace period starts {}",
                            today
                        ),
                        email: None,
                    });
                };
                let grace_end = since + Duration::days(self.services.policy.subscription.grace_period_days);
                if grace_end > today {
                    return Err(format!("in grace period until {}", grace_end));
                }
                Ok(Transition {
                    patch: json!({ "status": SubscriptionStatus::Suspended }),
                    message: format!("grace period ended {}, suspended", grace_end),
                    email: Some((
                        "Your subscription has been suspended".to_string(),
                        format!(
                            "Your {} plan was suspended because payment was not received \
                             by {}.",
                            sub.plan_name, grace_end
                        ),
                    )),
                })
            }
            other => Err(format!("status '{}' needs no renewal", other)),
        }
    }

    async fn process(
        &self,
        sub: &Subscription,
        tenant: Option<&Tenant>,
        overdue: bool,
        today: NaiveDate,
    ) -> Result<ItemResult> {
        let transition = match self.plan(sub, overdue, today) {
            Ok(t) => t,
            Err(reason) => return Ok(ItemResult::Skipped(reason)),
        };
        let _: Subscription = self
            .services
            .entities
            .update(&sub.id, transition.patch)
            .await?;

        if let Some((subject, body)) = transition.email {
            let to = tenant.and_then(|t| t.owner_email.as_deref());
            self.services.notify(to, subject, body).await;
        }
        Ok(ItemResult::Done(transition.message))
    }
}

#[async_trait::async_trait]
impl<S, N> Job for RenewalJob<S, N>
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
{
    fn name(&self) -> &'static str {
        "process_subscription_renewal"
    }

    async fn run(&self, ctx: &JobContext) -> Result<JobReport> {
        let mut report = JobReport::new(self.name(), ctx);
        let entities = &self.services.entities;

        let listed = entities.list::<Subscription>().await?;
        let subscriptions = report.accept(listed);
        let listed = entities.list::<Tenant>().await?;
        let tenants: HashMap<String, Tenant> = report
            .accept(listed)
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        let listed = entities
            .filter::<Invoice>(&Query::new().eq("status", InvoiceStatus::Overdue))
            .await?;
        let overdue: HashSet<String> = listed
            .rejected
            .iter()
            .filter_map(|r| r.field("tenant_id").map(str::to_string))
            .chain(listed.records.iter().map(|i| i.tenant_id.clone()))
            .collect();
        report.accept(listed);

        let mut changed: HashMap<&'static str, usize> = HashMap::new();
        for sub in &subscriptions {
            let result = self
                .process(
                    sub,
                    tenants.get(&sub.tenant_id),
                    overdue.contains(&sub.tenant_id),
                    ctx.run_date,
                )
                .await;
            if let Ok(ItemResult::Done(_)) = &result {
                *changed.entry(sub.status.as_str()).or_default() += 1;
            }
            report.record_result(&sub.id, result);
        }

        report.set_summary("subscriptions_checked", subscriptions.len());
        for (from, count) in changed {
            report.set_summary(&format!("changed_from_{}", from), count);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::*;
    use crate::domain::model::BillingCycle;

    fn find(fx: &Fixture, id: &str) -> Subscription {
        fx.store
            .all::<Subscription>()
            .unwrap()
            .into_iter()
            .find(|s| s.id == id)
            .unwrap()
    }

    #[test]
    fn test_advance_period_catches_up_missed_cycles() {
        let (start, next, cycles) = advance_period(day("2026-08-31"), 1, day("2026-10-15"));
        assert_eq!(start, day("2026-09-30"));
        assert_eq!(next, day("2026-10-30"));
        assert_eq!(cycles, 2);

        let (start, next, cycles) = advance_period(day("2026-10-01"), 12, day("2026-10-01"));
        assert_eq!((start, next, cycles), (day("2026-10-01"), day("2027-10-01"), 1));
    }

    #[tokio::test]
    async fn test_renews_due_subscription() {
        let fx = Fixture::new();
        fx.store.seed(&[tenant("t1")]).unwrap();
        let mut sub = subscription("s1", "t1", 29000, SubscriptionStatus::Active);
        sub.current_period_start = Some(day("2026-09-19"));
        sub.next_billing_date = Some(day("2026-10-19"));
        let mut later = subscription("s2", "t1", 29000, SubscriptionStatus::Active);
        later.next_billing_date = Some(day("2026-11-02"));
        fx.store.seed(&[sub, later]).unwrap();

        let report = RenewalJob::new(fx.services())
            .run(&ctx("2026-10-19"))
            .await
            .unwrap();

        assert_eq!((report.succeeded, report.skipped), (1, 1));
        let renewed = find(&fx, "s1");
        assert_eq!(renewed.status, SubscriptionStatus::Active);
        assert_eq!(renewed.current_period_start, Some(day("2026-10-19")));
        assert_eq!(renewed.next_billing_date, Some(day("2026-11-19")));
        assert_eq!(renewed.renewal_count, 1);
        assert_eq!(fx.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_trial_expiry_and_no_auto_renew() {
        let fx = Fixture::new();
        fx.store.seed(&[tenant("t1")]).unwrap();
        let mut trial = subscription("s1", "t1", 0, SubscriptionStatus::Trial);
        trial.trial_end_date = Some(day("2026-10-10"));
        trial.billing_cycle = BillingCycle::Yearly;
        let mut manual = subscription("s2", "t1", 29000, SubscriptionStatus::Active);
        manual.auto_renew = false;
        manual.next_billing_date = Some(day("2026-10-01"));
        fx.store.seed(&[trial, manual]).unwrap();

        RenewalJob::new(fx.services())
            .run(&ctx("2026-10-19"))
            .await
            .unwrap();

        let activated = find(&fx, "s1");
        assert_eq!(activated.status, SubscriptionStatus::Active);
        assert_eq!(activated.next_billing_date, Some(day("2027-10-10")));
        assert_eq!(find(&fx, "s2").status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn test_past_due_lifecycle() {
        let fx = Fixture::new();
        fx.store.seed(&[tenant("t1"), tenant("t2")]).unwrap();
        fx.store
            .seed(&[invoice("i1", "t1", InvoiceStatus::Overdue, "2026-09-01", "2026-09-15")])
            .unwrap();
        let mut due = subscription("s1", "t1", 29000, SubscriptionStatus::Active);
        due.next_billing_date = Some(day("2026-10-01"));
        let mut paid_up = subscription("s2", "t2", 29000, SubscriptionStatus::PastDue);
        paid_up.past_due_since = Some(day("2026-09-20"));
        fx.store.seed(&[due, paid_up]).unwrap();

        let job = RenewalJob::new(fx.services());
        job.run(&ctx("2026-10-01")).await.unwrap();
        let past_due = find(&fx, "s1");
        assert_eq!(past_due.status, SubscriptionStatus::PastDue);
        assert_eq!(past_due.past_due_since, Some(day("2026-10-01")));
        let reactivated = find(&fx, "s2");
        assert_eq!(reactivated.status, SubscriptionStatus::Active);
        assert_eq!(reactivated.past_due_since, None);

        let inside_grace = job.run(&ctx("2026-10-05")).await.unwrap();
        assert!(inside_grace.outcome("s1").unwrap().message.contains("grace period"));

        job.run(&ctx("2026-10-08")).await.unwrap();
        assert_eq!(find(&fx, "s1").status, SubscriptionStatus::Suspended);
    }

    #[tokio::test]
    async fn test_past_due_without_start_date_gets_one() {
        let fx = Fixture::new();
        fx.store.seed(&[tenant("t1")]).unwrap();
        fx.store
            .seed(&[invoice("i1", "t1", InvoiceStatus::Overdue, "2026-02-01", "2026-02-15")])
            .unwrap();
        fx.store
            .seed(&[subscription("s1", "t1", 29000, SubscriptionStatus::PastDue)])
            .unwrap();

        let job = RenewalJob::new(fx.services());
        let first = job.run(&ctx("2026-03-01")).await.unwrap();
        assert_eq!(first.succeeded, 1);
        let marked = find(&fx, "s1");
        assert_eq!(marked.status, SubscriptionStatus::PastDue);
        assert_eq!(marked.past_due_since, Some(day("2026-03-01")));

        job.run(&ctx("2026-06-01")).await.unwrap();
        let suspended = find(&fx, "s1");
        assert_eq!(suspended.status, SubscriptionStatus::Suspended);
        assert_eq!(suspended.past_due_since, Some(day("2026-03-01")));
    }

    #[tokio::test]
    async fn test_undecodable_tenant_does_not_stop_renewals() {
        let fx = Fixture::new();
        fx.store.seed(&[tenant("t1")]).unwrap();
        fx.store
            .seed_raw("Tenant", vec![serde_json::json!({"id": "t9", "status": "active"})])
            .unwrap();
        let mut sub = subscription("s1", "t1", 29000, SubscriptionStatus::Active);
        sub.next_billing_date = Some(day("2026-10-01"));
        fx.store.seed(&[sub]).unwrap();

        let report = RenewalJob::new(fx.services())
            .run(&ctx("2026-10-01"))
            .await
            .unwrap();

        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert!(report.outcome("t9").unwrap().message.contains("name"));
        assert_eq!(find(&fx, "s1").next_billing_date, Some(day("2026-11-01")));
    }
}
