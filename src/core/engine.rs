use crate::core::job::{Job, JobContext, JobReport};
use crate::core::sequence::JobSequence;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use crate::utils::monitor::RunMonitor;
use std::io::Write;
use std::time::Instant;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Runs jobs, logs their progress and optionally archives each report.
pub struct JobEngine<St: Storage> {
    monitor: RunMonitor,
    archive: Option<ReportArchive<St>>,
}

impl<St: Storage> JobEngine<St> {
    pub fn new() -> Self {
        Self {
            monitor: RunMonitor::new(false),
            archive: None,
        }
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = RunMonitor::new(enabled);
        if enabled {
            tracing::info!("🔍 System monitoring enabled");
        }
        self
    }

    pub fn with_archive(mut self, storage: St, prefix: &str) -> Self {
        self.archive = Some(ReportArchive::new(storage, prefix));
        self
    }

    pub async fn run(&self, job: &dyn Job, ctx: &JobContext) -> Result<JobReport> {
        let started = Instant::now();
        tracing::info!(
            "🚀 Starting {} (run date {}, execution {}{})",
            job.name(),
            ctx.run_date,
            ctx.execution_id,
            if ctx.dry_run { ", dry run" } else { "" }
        );
        self.monitor.log_phase(job.name(), "start");

        let report = job.run(ctx).await?;

        self.monitor.log_phase(job.name(), "finish");
        tracing::info!(
            "✅ {} finished in {:?}: {} processed, {} succeeded, {} skipped, {} failed",
            job.name(),
            started.elapsed(),
            report.processed,
            report.succeeded,
            report.skipped,
            report.failed
        );

        self.archive_report(&report).await;
        Ok(report)
    }

    /// Runs every applicable job in order. A job that aborts is logged and
    /// reported; the remaining jobs still run.
    pub async fn run_sequence(&self, sequence: &JobSequence, ctx: &JobContext) -> Vec<JobReport> {
        let mut reports = Vec::new();

        for job in sequence.jobs() {
            if !job.should_run(ctx) {
                tracing::info!("⏭️ Skipping {} (not scheduled for {})", job.name(), ctx.run_date);
                continue;
            }

            match self.run(job.as_ref(), ctx).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(
                        "❌ {} aborted: {} (Category: {:?}, Severity: {:?})",
                        job.name(),
                        e,
                        e.category(),
                        e.severity()
                    );
                    let report = JobReport::aborted(job.name(), ctx, &e);
                    self.archive_report(&report).await;
                    reports.push(report);
                }
            }
        }

        reports
    }

    async fn archive_report(&self, report: &JobReport) {
        if let Some(archive) = &self.archive {
            match archive.store(report).await {
                Ok(path) => tracing::info!("📁 Report saved to: {}", path),
                Err(e) => tracing::error!("❌ Could not archive {} report: {}", report.job, e),
            }
        }
    }
}

impl<St: Storage> Default for JobEngine<St> {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `<prefix>/<job>-<date>.zip` holding `report.json` and
/// `outcomes.csv`.
pub struct ReportArchive<St: Storage> {
    storage: St,
    prefix: String,
}

impl<St: Storage> ReportArchive<St> {
    pub fn new(storage: St, prefix: &str) -> Self {
        Self {
            storage,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn path_for(&self, report: &JobReport) -> String {
        let file = format!(
            "{}-{}{}.zip",
            report.job,
            report.run_date,
            if report.dry_run { "-dry-run" } else { "" }
        );
        if self.prefix.is_empty() {
            file
        } else {
            format!("{}/{}", self.prefix, file)
        }
    }

    pub async fn store(&self, report: &JobReport) -> Result<String> {
        let path = self.path_for(report);
        let data = build_archive(report)?;
        tracing::debug!("Writing report archive ({} bytes) to {}", data.len(), path);
        self.storage.write_file(&path, &data).await?;
        Ok(path)
    }
}

pub fn build_archive(report: &JobReport) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    zip.start_file("report.json", SimpleFileOptions::default())?;
    zip.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;

    zip.start_file("outcomes.csv", SimpleFileOptions::default())?;
    zip.write_all(&outcomes_csv(report)?)?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

fn outcomes_csv(report: &JobReport) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for outcome in &report.outcomes {
        writer.serialize(outcome)?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::BillingError;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::io::Read;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                BillingError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    struct FixedJob {
        abort: bool,
    }

    #[async_trait::async_trait]
    impl Job for FixedJob {
        fn name(&self) -> &'static str {
            if self.abort {
                "broken_job"
            } else {
                "fixed_job"
            }
        }

        async fn run(&self, ctx: &JobContext) -> Result<JobReport> {
            if self.abort {
                return Err(BillingError::JobError {
                    job: self.name().to_string(),
                    message: "store unreachable".to_string(),
                });
            }
            let mut report = JobReport::new(self.name(), ctx);
            report.succeed("inv-1", "issued");
            report.skip("inv-2", "already issued");
            Ok(report)
        }
    }

    fn ctx() -> JobContext {
        JobContext::new(NaiveDate::from_ymd_opt(2026, 10, 1).unwrap())
    }

    #[tokio::test]
    async fn test_report_is_archived_as_zip() {
        let storage = MockStorage::default();
        let engine = JobEngine::new().with_archive(storage.clone(), "reports/");

        let report = engine.run(&FixedJob { abort: false }, &ctx()).await.unwrap();
        assert_eq!(report.processed, 2);

        let data = storage.read_file("reports/fixed_job-2026-10-01.zip").await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut csv_content = String::new();
        archive
            .by_name("outcomes.csv")
            .unwrap()
            .read_to_string(&mut csv_content)
            .unwrap();
        assert!(csv_content.starts_with("entity_id,status,message"));
        assert!(csv_content.contains("inv-2,skipped,already issued"));
    }

    #[tokio::test]
    async fn test_sequence_continues_after_abort() {
        let engine: JobEngine<MockStorage> = JobEngine::new();
        let mut sequence = JobSequence::new();
        sequence.add(Box::new(FixedJob { abort: true }));
        sequence.add(Box::new(FixedJob { abort: false }));

        let reports = engine.run_sequence(&sequence, &ctx()).await;
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].success());
        assert_eq!(reports[0].job, "broken_job");
        assert!(reports[1].success());
    }

    #[test]
    fn test_dry_run_archive_name() {
        let archive = ReportArchive::new(MockStorage::default(), "");
        let report = JobReport::new("generate_monthly_invoices", &ctx().with_dry_run(true));
        assert_eq!(
            archive.path_for(&report),
            "generate_monthly_invoices-2026-10-01-dry-run.zip"
        );
    }
}
