//! # backup-notifier
//!
//! A backup agent that snapshots a MySQL database and/or a storage directory,
//! encrypts the snapshot into a password protected ZIP archive and uploads it
//! to a remote collector over HTTPS.
//!
//! ## Features
//!
//! - **Database snapshots**: `mysqldump` with table exclusions, password passed through the environment
//! - **Storage snapshots**: recursive archiving with path and prefix exclusions
//! - **Encryption**: AES-256 ZIP through `7z` or the built-in zip library, picked by availability
//! - **Upload**: multipart HTTPS upload with SHA-256 checksum header and bounded retries
//! - **Cleanup**: local artifacts are deleted after every upload, successful or not
//! - **Scheduled Backups**: Cron-based daemon mode
//!
//! ## Quick Start
//!
//! ```no_run
//! use backup_notifier::backup::backup_config::BackupConfig;
//! use backup_notifier::backup::backup_type::BackupType;
//! use backup_notifier::backup::pipeline::BackupPipeline;
//!
//! let config = BackupConfig::load("config.yml")?;
//! let pipeline = BackupPipeline::from_config(&config)?;
//! let report = pipeline.run(BackupType::Database, chrono::Utc::now())?;
//! println!("uploaded: {}", report.upload.is_success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
