use crate::backup::backup_type::BackupType;
use crate::backup::pipeline::{BackupPipeline, RunReport};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use tracing::{error, info, warn};

/// First occurrence of `cron` strictly after `after`.
pub fn next_run(cron: &str, after: &DateTime<Utc>) -> Result<DateTime<Utc>> {
    cron_parser::parse(cron, after)
        .map_err(|e| Error::Config(format!("Invalid cron string {cron:?}: {e:?}")))
}

pub fn log_report(report: &RunReport) {
    if report.upload.is_success() {
        info!(
            "{} completed: {} bytes in {:?}",
            report.backup_type, report.artifact_size, report.elapsed
        );
    } else {
        warn!(
            "{} completed with a failed upload after {:?}",
            report.backup_type, report.elapsed
        );
    }
}

/// Runs every type in `backup_types` in order. A failing type does not stop
/// the ones after it; all failures are returned together.
pub fn run_once(
    pipeline: &BackupPipeline,
    backup_types: &[BackupType],
    now: DateTime<Utc>,
) -> (Vec<RunReport>, Option<Error>) {
    let (reports, errors): (Vec<_>, Vec<_>) = backup_types
        .iter()
        .map(|backup_type| pipeline.run(*backup_type, now))
        .partition_result();

    reports.iter().for_each(log_report);
    let error = if errors.is_empty() {
        None
    } else {
        Some(Error::from(errors))
    };
    (reports, error)
}

/// Sleeps until each occurrence of `cron` and runs the configured types.
/// Only returns on an invalid schedule.
pub fn start_loop(pipeline: &BackupPipeline, cron: &str) -> Result<()> {
    let backup_types = pipeline.configured_types();
    if backup_types.is_empty() {
        return Err(Error::Config(
            "neither database nor storage is configured".into(),
        ));
    }

    let mut next = next_run(cron, &Utc::now())?;
    loop {
        let now = Utc::now();
        if now < next {
            info!("Sleeping until {next}");
            std::thread::sleep((next - now).to_std().unwrap_or_default());
        } else {
            info!("Running scheduled backups: {}", backup_types.iter().join(", "));
            let (_, error) = run_once(pipeline, &backup_types, now);
            if let Some(error) = error {
                error!("Scheduled backup failed: {error}");
            }
            next = next_run(cron, &now)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::pipeline::testing::FakeSnapshotter;
    use crate::backup::upload::transport::testing::ScriptedTransport;
    use crate::backup::upload::{UploadConfig, Uploader};
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_next_run() {
        let after = Utc.with_ymd_and_hms(2026, 10, 19, 1, 0, 0).unwrap();
        assert_eq!(
            next_run("0 2 * * *", &after).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 19, 2, 0, 0).unwrap()
        );

        let at = Utc.with_ymd_and_hms(2026, 10, 19, 2, 0, 0).unwrap();
        assert_eq!(
            next_run("0 2 * * *", &at).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 20, 2, 0, 0).unwrap()
        );
        assert!(matches!(next_run("nope", &at), Err(Error::Config(_))));
    }

    #[test]
    fn test_run_once_continues_after_a_failure() {
        let temp_dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let pipeline = BackupPipeline::builder()
            .database(Arc::new(FakeSnapshotter {
                backup_type: BackupType::Database,
                dir: None,
            }))
            .storage(Arc::new(FakeSnapshotter {
                backup_type: BackupType::Storage,
                dir: Some(temp_dir.path().to_path_buf()),
            }))
            .uploader(Uploader::new(transport.clone(), UploadConfig::default()))
            .token("tok-123456")
            .endpoint("https://collector.example.com")
            .build();

        let (reports, error) = run_once(&pipeline, &BackupType::ALL, Utc::now());

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].backup_type, BackupType::Storage);
        assert!(matches!(error.unwrap().root(), Error::LotsOfError(_)));
        assert_eq!(transport.posts().len(), 1);
    }

    #[test]
    fn test_loop_without_configured_types_fails() {
        let pipeline = BackupPipeline::builder()
            .uploader(Uploader::new(
                Arc::new(ScriptedTransport::new(vec![])),
                UploadConfig::default(),
            ))
            .token("tok-123456")
            .endpoint("https://collector.example.com")
            .build();

        assert!(matches!(
            start_loop(&pipeline, "0 2 * * *"),
            Err(Error::Config(_))
        ));
    }
}
