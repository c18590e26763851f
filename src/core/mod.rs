pub mod analytics;
pub mod commission;
pub mod engine;
pub mod invoicing;
pub mod job;
pub mod reminders;
pub mod renewal;
pub mod sequence;
pub mod settlement;
pub mod suspension;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{JobEngine, ReportArchive};
pub use job::{BillingServices, Job, JobContext, JobReport};
pub use sequence::JobSequence;
