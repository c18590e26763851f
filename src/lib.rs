pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, CliConfig, Command};

#[cfg(feature = "lambda")]
pub use config::lambda::{LambdaConfig, S3Storage};

pub use config::toml_config::BillingConfig;
pub use core::{BillingServices, Job, JobContext, JobEngine, JobReport, JobSequence};
pub use utils::error::{BillingError, Result};
