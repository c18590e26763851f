use crate::domain::model::EmailMessage;
use crate::domain::period::BillingMonth;
use crate::domain::policy::BillingPolicy;
use crate::domain::ports::{Decoded, Entities, EntityStore, Notifier};
use crate::utils::error::{BillingError, Result};
use crate::utils::validation::validate_email;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Inputs of a single job invocation.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub run_date: NaiveDate,
    /// Explicit settlement/invoice month; monthly jobs default to the
    /// month before `run_date`.
    pub month: Option<BillingMonth>,
    /// Analytics day; defaults to the day before `run_date`.
    pub target_day: Option<NaiveDate>,
    pub order_id: Option<String>,
    pub dry_run: bool,
    pub execution_id: String,
}

impl JobContext {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            month: None,
            target_day: None,
            order_id: None,
            dry_run: false,
            execution_id: format!("{}-{}", run_date, Utc::now().timestamp_millis()),
        }
    }

    pub fn with_month(mut self, month: Option<BillingMonth>) -> Self {
        self.month = month;
        self
    }

    pub fn with_target_day(mut self, day: Option<NaiveDate>) -> Self {
        self.target_day = day;
        self
    }

    pub fn with_order_id(mut self, order_id: Option<String>) -> Self {
        self.order_id = order_id;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn billing_month(&self) -> BillingMonth {
        self.month
            .unwrap_or_else(|| BillingMonth::of(self.run_date).previous())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Skipped,
    Failed,
}

/// Result of handling one entity inside a job loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    Done(String),
    Skipped(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub entity_id: String,
    pub status: OutcomeStatus,
    pub message: String,
}

/// What a job did, item by item. Serialized as the CLI/Lambda output.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: String,
    pub run_date: NaiveDate,
    pub execution_id: String,
    pub dry_run: bool,
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<ItemOutcome>,
    pub summary: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobReport {
    pub fn new(job: &str, ctx: &JobContext) -> Self {
        Self {
            job: job.to_string(),
            run_date: ctx.run_date,
            execution_id: ctx.execution_id.clone(),
            dry_run: ctx.dry_run,
            processed: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            outcomes: Vec::new(),
            summary: Map::new(),
            error: None,
        }
    }

    /// Report for a job that aborted before or while iterating.
    pub fn aborted(job: &str, ctx: &JobContext, error: &BillingError) -> Self {
        let mut report = Self::new(job, ctx);
        report.error = Some(error.to_string());
        report
    }

    fn record(&mut self, entity_id: &str, status: OutcomeStatus, message: String) {
        self.processed += 1;
        match status {
            OutcomeStatus::Succeeded => self.succeeded += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.outcomes.push(ItemOutcome {
            entity_id: entity_id.to_string(),
            status,
            message,
        });
    }

    pub fn succeed(&mut self, entity_id: &str, message: impl Into<String>) {
        self.record(entity_id, OutcomeStatus::Succeeded, message.into());
    }

    pub fn skip(&mut self, entity_id: &str, reason: impl Into<String>) {
        self.record(entity_id, OutcomeStatus::Skipped, reason.into());
    }

    /// Logs and records a per-item failure; the job carries on.
    pub fn fail(&mut self, entity_id: &str, error: &BillingError) {
        tracing::error!(job = %self.job, entity_id, "❌ {}", error);
        self.record(entity_id, OutcomeStatus::Failed, error.to_string());
    }

    pub fn record_result(&mut self, entity_id: &str, result: Result<ItemResult>) {
        match result {
            Ok(ItemResult::Done(message)) => {
                tracing::info!(job = %self.job, entity_id, "{}", message);
                self.succeed(entity_id, message);
            }
            Ok(ItemResult::Skipped(reason)) => {
                tracing::debug!(job = %self.job, entity_id, "skipped: {}", reason);
                self.skip(entity_id, reason);
            }
            Err(e) => self.fail(entity_id, &e),
        }
    }

    /// Records a failure for every record that could not be decoded and
    /// returns the ones that could.
    pub fn accept<E>(&mut self, decoded: Decoded<E>) -> Vec<E> {
        for rejected in &decoded.rejected {
            self.fail(&rejected.id, &rejected.error);
        }
        decoded.records
    }

    pub fn set_summary(&mut self, key: &str, value: impl Into<Value>) {
        self.summary.insert(key.to_string(), value.into());
    }

    pub fn success(&self) -> bool {
        self.error.is_none() && self.failed == 0
    }

    pub fn outcome(&self, entity_id: &str) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| o.entity_id == entity_id)
    }
}

/// A scheduled billing job.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lets a sequence skip jobs that do not apply to the run date.
    fn should_run(&self, _ctx: &JobContext) -> bool {
        true
    }

    async fn run(&self, ctx: &JobContext) -> Result<JobReport>;
}

/// Store, mailer and rules handed to every job.
pub struct BillingServices<S: EntityStore, N: Notifier> {
    pub entities: Entities<S>,
    pub notifier: Arc<N>,
    pub policy: Arc<BillingPolicy>,
}

impl<S: EntityStore, N: Notifier> Clone for BillingServices<S, N> {
    fn clone(&self) -> Self {
        Self {
            entities: self.entities.clone(),
            notifier: Arc::clone(&self.notifier),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<S: EntityStore, N: Notifier> BillingServices<S, N> {
    pub fn new(store: Arc<S>, notifier: Arc<N>, policy: BillingPolicy) -> Self {
        Self {
            entities: Entities::new(store),
            notifier,
            policy: Arc::new(policy),
        }
    }

    /// Sends an email if notifications are enabled. Returns whether a
    /// message actually went out.
    pub async fn send_email(&self, to: &str, subject: String, body: String) -> Result<bool> {
        if !self.policy.notifications.enabled {
            return Ok(false);
        }
        let message = EmailMessage {
            to: to.to_string(),
            subject,
            body,
        };
        self.notifier.send_email(&message).await?;
        Ok(true)
    }

    /// Best-effort notification: a failed email is logged and does not undo
    /// the state change it reports.
    pub async fn notify(&self, to: Option<&str>, subject: String, body: String) {
        let Some(to) = to.filter(|t| !t.trim().is_empty()) else {
            tracing::warn!("No recipient for '{}', email not sent", subject);
            return;
        };
        if let Err(e) = validate_email("owner_email", to) {
            tracing::warn!("⚠️ Skipping '{}': {}", subject, e);
            return;
        }
        if let Err(e) = self.send_email(to, subject, body).await {
            tracing::warn!("⚠️ Email to {} failed: {}", to, e);
        }
    }
}
