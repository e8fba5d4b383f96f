use crate::backup::archive::manager::ZipManager;
use crate::backup::backup_config::BackupConfig;
use crate::backup::backup_type::BackupType;
use crate::backup::function_path;
use crate::backup::process::{ProcessRunner, SystemProcessRunner};
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithFnName, WithMsg};
use crate::backup::snapshot::database::DatabaseSnapshotter;
use crate::backup::snapshot::storage::StorageSnapshotter;
use crate::backup::snapshot::Snapshotter;
use crate::backup::upload::transport::HttpTransport;
use crate::backup::upload::{UploadOutcome, Uploader};

use bon::Builder;
use chrono::{DateTime, Utc};
use function_name::named;

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of one completed run. A failed upload still completes the run.
#[derive(Debug)]
pub struct RunReport {
    pub backup_type: BackupType,
    pub artifact_size: u64,
    pub upload: UploadOutcome,
    pub elapsed: Duration,
}

/// Snapshot, upload, clean up
#[derive(Clone, Debug, Builder)]
pub struct BackupPipeline {
    database: Option<Arc<dyn Snapshotter>>,
    storage: Option<Arc<dyn Snapshotter>>,
    uploader: Uploader,
    #[builder(into)]
    token: RedactedString,
    #[builder(into)]
    endpoint: String,
}

impl BackupPipeline {
    /// Wires the system process runner, both zip strategies and the HTTP
    /// transport according to `config`.
    pub fn from_config(config: &BackupConfig) -> Result<Self> {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemProcessRunner);
        let zip_manager = ZipManager::system(runner.clone(), config.archiver_binary().as_str());

        let database = config.database().as_ref().map(|source| {
            Arc::new(
                DatabaseSnapshotter::builder()
                    .runner(runner.clone())
                    .zip_manager(zip_manager.clone())
                    .layout(config.layout())
                    .source(source.clone())
                    .excluded_tables(config.excluded_tables().clone())
                    .maybe_password(config.backup_zip_password().clone())
                    .zip_strategy(*config.zip_strategy())
                    .build(),
            ) as Arc<dyn Snapshotter>
        });

        let storage = match (config.storage(), config.backup_zip_password()) {
            (Some(storage), Some(password)) if !password.is_empty() => Some(Arc::new(
                StorageSnapshotter::builder()
                    .zip_manager(zip_manager.clone())
                    .layout(config.layout())
                    .src_dir(storage.src_dir().clone())
                    .password(password.clone())
                    .exclusions(config.excluded_files().clone())
                    .zip_strategy(*config.zip_strategy())
                    .build(),
            ) as Arc<dyn Snapshotter>),
            (Some(_), _) => {
                return Err(Error::Config(
                    "storage backups need backup_zip_password".into(),
                ))
            }
            (None, _) => None,
        };

        let transport = HttpTransport::new(*config.upload().timeout())?;
        Ok(BackupPipeline::builder()
            .maybe_database(database)
            .maybe_storage(storage)
            .uploader(Uploader::new(Arc::new(transport), config.upload().clone()))
            .token(config.backup_code().clone())
            .endpoint(config.backup_url().as_str())
            .build())
    }

    pub fn configured_types(&self) -> Vec<BackupType> {
        BackupType::ALL
            .into_iter()
            .filter(|backup_type| self.snapshotter(*backup_type).is_some())
            .collect()
    }

    fn snapshotter(&self, backup_type: BackupType) -> Option<&Arc<dyn Snapshotter>> {
        match backup_type {
            BackupType::Database => self.database.as_ref(),
            BackupType::Storage => self.storage.as_ref(),
        }
    }

    /// Runs one backup of `backup_type`.
    ///
    /// Missing configuration and snapshot failures are errors. Upload
    /// failures are not, they are reported in the returned `RunReport`.
    #[named]
    pub fn run(&self, backup_type: BackupType, now: DateTime<Utc>) -> Result<RunReport> {
        let snapshotter = self
            .snapshotter(backup_type)
            .ok_or_else(|| Error::Config(format!("{backup_type} is not configured")))?;
        if self.token.is_empty() || self.endpoint.trim().is_empty() {
            return Err(Error::Config(
                "BACKUP_CODE and BACKUP_URL must be set".into(),
            ));
        }

        tracing::info!("Starting {backup_type}");
        let started = Instant::now();
        let artifact = snapshotter
            .create_snapshot(now)
            .with_msg(format!("{backup_type} failed"))?;
        tracing::info!("Created backup file {:?} ({} bytes)", artifact.path(), artifact.size());

        let upload = self
            .uploader
            .send(&artifact, backup_type, &self.token, &self.endpoint)
            .with_fn_name(function_path!())?;

        Ok(RunReport {
            backup_type,
            artifact_size: *artifact.size(),
            upload,
            elapsed: started.elapsed(),
        })
    }
}
