use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Entity API returned {status} for {method} {url}: {body}")]
    ApiStatusError {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    #[error("Job '{job}' failed: {message}")]
    JobError { job: String, message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },
}

pub type Result<T> = std::result::Result<T, BillingError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    RemoteApi,
    Configuration,
    Data,
    Storage,
    Job,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl BillingError {
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::HttpError(_) => ErrorCategory::Network,
            Self::ApiStatusError { .. } | Self::NotFound { .. } => ErrorCategory::RemoteApi,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::SerializationError(_) | Self::InvalidData { .. } | Self::CsvError(_) => {
                ErrorCategory::Data
            }
            Self::ZipError(_) | Self::IoError(_) | Self::StorageError { .. } => {
                ErrorCategory::Storage
            }
            Self::JobError { .. } => ErrorCategory::Job,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::HttpError(_) => ErrorSeverity::Medium,
            Self::ApiStatusError { status, .. } if *status >= 500 => ErrorSeverity::Medium,
            Self::ApiStatusError { .. } | Self::NotFound { .. } | Self::InvalidData { .. } => {
                ErrorSeverity::High
            }
            Self::SerializationError(_) | Self::CsvError(_) | Self::JobError { .. } => {
                ErrorSeverity::High
            }
            Self::ZipError(_) | Self::IoError(_) | Self::StorageError { .. } => {
                ErrorSeverity::Critical
            }
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::ApiStatusError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check network connectivity to the entity API and retry",
            ErrorCategory::RemoteApi => {
                "Verify the API key, app id and entity names, then re-run the job"
            }
            ErrorCategory::Configuration => "Fix the configuration file or environment variables",
            ErrorCategory::Data => "Inspect the offending record in the entity store",
            ErrorCategory::Storage => "Check write permissions and free space for report output",
            ErrorCategory::Job => "Re-run the job for the same date once the cause is fixed",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::HttpError(_) => "Could not reach the entity API".to_string(),
            Self::ApiStatusError { status, .. } => {
                format!("The entity API rejected the request (HTTP {})", status)
            }
            Self::NotFound { entity, id } => format!("{} '{}' does not exist", entity, id),
            Self::MissingConfigError { field } => {
                format!("Required setting '{}' is missing", field)
            }
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_maps_server_errors_to_medium() {
        let err = BillingError::ApiStatusError {
            method: "GET".to_string(),
            url: "http://localhost/entities/Order".to_string(),
            status: 503,
            body: String::new(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.is_retryable());

        let err = BillingError::ApiStatusError {
            method: "PUT".to_string(),
            url: "http://localhost/entities/Order/1".to_string(),
            status: 400,
            body: "bad".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = BillingError::MissingConfigError {
            field: "store.base_url".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().contains("store.base_url"));
    }
}
