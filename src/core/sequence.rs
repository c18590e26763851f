use crate::core::analytics::AnalyticsJob;
use crate::core::commission::CommissionJob;
use crate::core::invoicing::InvoiceJob;
use crate::core::job::{BillingServices, Job};
use crate::core::reminders::ReminderJob;
use crate::core::renewal::RenewalJob;
use crate::core::settlement::SettlementJob;
use crate::core::suspension::SuspensionJob;
use crate::domain::ports::{EntityStore, Notifier};

/// Ordered list of jobs executed by [`crate::core::engine::JobEngine::run_sequence`].
#[derive(Default)]
pub struct JobSequence {
    jobs: Vec<Box<dyn Job>>,
}

impl JobSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, job: Box<dyn Job>) {
        self.jobs.push(job);
    }

    pub fn jobs(&self) -> &[Box<dyn Job>] {
        &self.jobs
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|j| j.name()).collect()
    }

    /// The once-a-day run. Commissions are computed first so the monthly
    /// settlement sees yesterday's orders; settlement precedes invoicing,
    /// renewal precedes suspension. Settlement and invoicing gate
    /// themselves on the configured billing day.
    pub fn daily<S, N>(services: &BillingServices<S, N>) -> Self
    where
        S: EntityStore + 'static,
        N: Notifier + 'static,
    {
        let mut sequence = Self::new();
        sequence.add(Box::new(CommissionJob::new(services.clone())));
        sequence.add(Box::new(SettlementJob::new(services.clone()).on_billing_day_only()));
        sequence.add(Box::new(InvoiceJob::new(services.clone()).on_billing_day_only()));
        sequence.add(Box::new(RenewalJob::new(services.clone())));
        sequence.add(Box::new(ReminderJob::new(services.clone())));
        sequence.add(Box::new(SuspensionJob::new(services.clone())));
        sequence.add(Box::new(AnalyticsJob::new(services.clone())));
        sequence
    }
}
