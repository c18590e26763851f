use crate::config::StoreSettings;
use crate::domain::policy::BillingPolicy;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{BillingError, Result};
use crate::utils::validation::{validate_path, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    pub store: StoreSettings,
    #[serde(flatten)]
    pub policy: BillingPolicy,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory (CLI) or key prefix (Lambda) for zipped run reports.
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

fn env_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"))
}

impl BillingConfig {
    /// Loads and parses a TOML file, substituting `${VAR}` placeholders.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(BillingError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);

        toml::from_str(&processed).map_err(|e| BillingError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are
    /// left untouched so validation can point at them.
    fn substitute_env_vars(content: &str) -> String {
        env_placeholder()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.enabled
    }
}

impl Validate for BillingConfig {
    fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.policy.validate()?;
        if let Some(dir) = &self.report.output_dir {
            validate_path("report.output_dir", dir)?;
        }
        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }
}

impl ConfigProvider for BillingConfig {
    fn store_settings(&self) -> &StoreSettings {
        &self.store
    }

    fn policy(&self) -> &BillingPolicy {
        &self.policy
    }

    fn report_prefix(&self) -> Option<&str> {
        self.report.output_dir.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::OrderStatus;
    use rust_decimal::Decimal;

    const SAMPLE: &str = r#"
[store]
base_url = "https://app.example.com/api/apps/zerofarm"
api_key = "${MULTISHOP_TEST_API_KEY}"
timeout_seconds = 10

[commission]
default_rate = 2.5
eligible_statuses = ["delivered", "completed"]

[invoice]
due_days = 10
billing_day = 2

[reminders]
days_before_due = [5, 1]

[report]
output_dir = "./reports"
"#;

    #[test]
    fn test_parse_with_partial_sections() {
        std::env::set_var("MULTISHOP_TEST_API_KEY", "secret-key");
        let config = BillingConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.store.api_key.as_deref(), Some("secret-key"));
        assert_eq!(config.store.timeout_seconds, 10);
        assert_eq!(config.store.retry_attempts, 2);
        assert_eq!(config.policy.commission.default_rate, Decimal::new(25, 1));
        assert_eq!(
            config.policy.commission.eligible_statuses,
            vec![OrderStatus::Delivered, OrderStatus::Completed]
        );
        assert_eq!(config.policy.invoice.due_days, 10);
        assert_eq!(config.policy.invoice.currency, "KRW");
        assert_eq!(config.policy.reminders.days_before_due, vec![5, 1]);
        assert_eq!(config.policy.suspension.overdue_days, 30);
        assert_eq!(config.report_prefix(), Some("./reports"));
        assert!(!config.monitoring_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_env_var_is_kept() {
        let out = BillingConfig::substitute_env_vars("key = \"${MULTISHOP_SURELY_UNSET_VAR}\"");
        assert_eq!(out, "key = \"${MULTISHOP_SURELY_UNSET_VAR}\"");
    }

    #[test]
    fn test_missing_store_section_fails() {
        let err = BillingConfig::from_toml_str("[invoice]\ndue_days = 3\n").unwrap_err();
        assert!(matches!(err, BillingError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_invalid_base_url_fails_validation() {
        let config =
            BillingConfig::from_toml_str("[store]\nbase_url = \"ftp://example.com\"\n").unwrap();
        assert!(config.validate().is_err());
    }
}
