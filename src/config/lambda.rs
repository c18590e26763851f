use crate::config::StoreSettings;
use crate::domain::policy::BillingPolicy;
use crate::domain::ports::{ConfigProvider, Storage};
use crate::utils::error::{BillingError, Result};
use crate::utils::validation::{validate_non_empty_string, Validate};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client as S3Client;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct LambdaConfig {
    pub store: StoreSettings,
    pub policy: BillingPolicy,
    pub report_bucket: Option<String>,
    pub report_prefix: String,
    pub s3_region: String,
}

impl LambdaConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("BILLING_API_URL").map_err(|_| BillingError::MissingConfigError {
            field: "BILLING_API_URL".to_string(),
        })?;

        let mut store = StoreSettings::new(base_url);
        store.api_key = env::var("BILLING_API_KEY").ok();
        store.timeout_seconds = parse_env("BILLING_API_TIMEOUT_SECONDS", store.timeout_seconds)?;
        store.retry_attempts = parse_env("BILLING_API_RETRY_ATTEMPTS", store.retry_attempts)?;

        let mut policy = BillingPolicy::default();
        policy.commission.default_rate =
            parse_env("DEFAULT_COMMISSION_RATE", policy.commission.default_rate)?;
        policy.invoice.due_days = parse_env("INVOICE_DUE_DAYS", policy.invoice.due_days)?;
        policy.invoice.billing_day = parse_env("BILLING_DAY", policy.invoice.billing_day)?;
        policy.subscription.grace_period_days =
            parse_env("GRACE_PERIOD_DAYS", policy.subscription.grace_period_days)?;
        policy.suspension.overdue_days =
            parse_env("SUSPENSION_OVERDUE_DAYS", policy.suspension.overdue_days)?;
        policy.notifications.enabled =
            parse_env("NOTIFICATIONS_ENABLED", policy.notifications.enabled)?;
        if let Ok(currency) = env::var("INVOICE_CURRENCY") {
            policy.invoice.currency = currency;
        }

        Ok(Self {
            store,
            policy,
            report_bucket: env::var("REPORT_BUCKET").ok().filter(|b| !b.is_empty()),
            report_prefix: env::var("REPORT_PREFIX").unwrap_or_else(|_| "billing-reports".to_string()),
            s3_region: env::var("S3_REGION").unwrap_or_else(|_| "ap-northeast-2".to_string()),
        })
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| BillingError::InvalidConfigValueError {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(default),
    }
}

impl ConfigProvider for LambdaConfig {
    fn store_settings(&self) -> &StoreSettings {
        &self.store
    }

    fn policy(&self) -> &BillingPolicy {
        &self.policy
    }

    fn report_prefix(&self) -> Option<&str> {
        self.report_bucket.as_ref().map(|_| self.report_prefix.as_str())
    }
}

impl Validate for LambdaConfig {
    fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.policy.validate()?;

        if let Some(bucket) = &self.report_bucket {
            validate_s3_bucket_name("REPORT_BUCKET", bucket)?;
            validate_non_empty_string("REPORT_PREFIX", &self.report_prefix)?;
        }
        validate_aws_region("S3_REGION", &self.s3_region)?;

        tracing::info!("✅ Lambda configuration validation passed");
        Ok(())
    }
}

fn validate_s3_bucket_name(field_name: &str, bucket_name: &str) -> Result<()> {
    if bucket_name.len() < 3 || bucket_name.len() > 63 {
        return Err(BillingError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bucket_name.to_string(),
            reason: "S3 bucket name must be between 3 and 63 characters".to_string(),
        });
    }

    if !bucket_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(BillingError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bucket_name.to_string(),
            reason: "S3 bucket name can only contain lowercase letters, numbers, hyphens, and dots"
                .to_string(),
        });
    }

    if bucket_name.starts_with('-') || bucket_name.ends_with('-') {
        return Err(BillingError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bucket_name.to_string(),
            reason: "S3 bucket name cannot start or end with a hyphen".to_string(),
        });
    }

    Ok(())
}

fn validate_aws_region(field_name: &str, region: &str) -> Result<()> {
    validate_non_empty_string(field_name, region)?;

    if !region
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(BillingError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: region.to_string(),
            reason: "AWS region can only contain lowercase letters, numbers, and hyphens"
                .to_string(),
        });
    }

    Ok(())
}

/// Report archive backend for Lambda runs.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

impl Storage for S3Storage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| BillingError::StorageError {
                message: format!("Failed to read s3://{}/{}: {}", self.bucket, path, DisplayErrorContext(&e)),
            })?;

        let data = resp.body.collect().await.map_err(|e| BillingError::StorageError {
            message: format!("Failed to collect S3 body: {}", e),
        })?;

        Ok(data.into_bytes().to_vec())
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type("application/zip")
            .body(data.to_vec().into())
            .send()
            .await
            .map_err(|e| BillingError::StorageError {
                message: format!("Failed to write s3://{}/{}: {}", self.bucket, path, DisplayErrorContext(&e)),
            })?;

        tracing::debug!("Uploaded {} bytes to s3://{}/{}", data.len(), self.bucket, path);
        Ok(())
    }
}
