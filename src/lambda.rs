use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client as S3Client;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use multishop_billing::app::{execute, JobKind};
use multishop_billing::config::lambda::{LambdaConfig, S3Storage};
use multishop_billing::core::{JobContext, JobEngine, JobReport};
use multishop_billing::domain::period::{parse_date, BillingMonth};
use multishop_billing::domain::ports::ConfigProvider;
use multishop_billing::utils::{logger, validation::Validate};
use multishop_billing::{BillingError, Result};
use serde::{Deserialize, Serialize};

/// Scheduled event payload, e.g. `{"job": "generate_monthly_invoices", "month": "2026-09"}`.
#[derive(Debug, Default, Deserialize)]
pub struct Request {
    pub job: String,
    /// Run date, defaults to today (UTC).
    pub date: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    pub order_id: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub success: bool,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reports: Vec<JobReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn from_reports(reports: Vec<JobReport>) -> Self {
        let failures: Vec<String> = reports
            .iter()
            .filter(|r| !r.success())
            .map(|r| match &r.error {
                Some(e) => format!("{}: {}", r.job, e),
                None => format!("{}: {} item(s) failed", r.job, r.failed),
            })
            .collect();
        Self {
            success: failures.is_empty(),
            status_code: if failures.is_empty() { 200 } else { 500 },
            reports,
            error: (!failures.is_empty()).then(|| failures.join("; ")),
        }
    }

    fn from_error(error: &BillingError) -> Self {
        Self {
            success: false,
            status_code: 500,
            reports: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

fn job_context(request: &Request) -> Result<JobContext> {
    let run_date = match &request.date {
        Some(raw) => parse_date("date", raw)?,
        None => chrono::Utc::now().date_naive(),
    };
    let month = request
        .month
        .as_deref()
        .map(str::parse::<BillingMonth>)
        .transpose()?;
    let day = request
        .day
        .as_deref()
        .map(|raw| parse_date("day", raw))
        .transpose()?;

    Ok(JobContext::new(run_date)
        .with_month(month)
        .with_target_day(day)
        .with_order_id(request.order_id.clone())
        .with_dry_run(request.dry_run))
}

async fn s3_storage(config: &LambdaConfig) -> Option<S3Storage> {
    let bucket = config.report_bucket.clone()?;
    let shared = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .region(Region::new(config.s3_region.clone()))
        .force_path_style(true)
        .build();
    Some(S3Storage::new(S3Client::from_conf(s3_config), bucket))
}

async fn handle(request: &Request) -> Result<Vec<JobReport>> {
    let kind: JobKind = request.job.parse()?;
    let ctx = job_context(request)?;

    let config = LambdaConfig::from_env()?;
    config.validate()?;

    let mut engine = JobEngine::new();
    if let (Some(storage), Some(prefix)) = (s3_storage(&config).await, config.report_prefix()) {
        engine = engine.with_archive(storage, prefix);
    }

    tracing::info!(job = %kind, execution_id = %ctx.execution_id, "Starting billing job");
    execute(kind, &config.store, config.policy.clone(), &engine, &ctx).await
}

async fn function_handler(event: LambdaEvent<Request>) -> std::result::Result<Response, Error> {
    let request = event.payload;
    let response = match handle(&request).await {
        Ok(reports) => Response::from_reports(reports),
        Err(e) => {
            tracing::error!(
                "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
                request.job,
                e,
                e.category(),
                e.severity()
            );
            Response::from_error(&e)
        }
    };

    if response.success {
        tracing::info!("✅ {} completed", request.job);
    }
    Ok(response)
}

#[tokio::main]
async fn main() -> std::result::Result<(), Error> {
    logger::init_lambda_logger();
    run(service_fn(function_handler)).await
}
