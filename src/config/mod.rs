#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod toml_config;

use crate::utils::error::Result;
use crate::utils::validation::{validate_range, validate_url, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Connection settings for the remote entity API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// e.g. `https://app.base44.com/api/apps/<app_id>`
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    1
}

impl StoreSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_seconds: default_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay_seconds: default_retry_delay(),
            headers: HashMap::new(),
        }
    }
}

impl Validate for StoreSettings {
    fn validate(&self) -> Result<()> {
        validate_url("store.base_url", &self.base_url)?;
        validate_range("store.timeout_seconds", self.timeout_seconds, 1, 300)?;
        validate_range("store.retry_attempts", self.retry_attempts, 0, 10)?;
        validate_range("store.retry_delay_seconds", self.retry_delay_seconds, 0, 60)?;
        if self.api_key.as_deref().is_some_and(|k| k.starts_with("${")) {
            tracing::warn!("store.api_key still contains an unresolved ${{...}} placeholder");
        }
        Ok(())
    }
}

#[cfg(feature = "cli")]
pub use cli::{CliConfig, Command};
