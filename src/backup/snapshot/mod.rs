pub mod database;
pub mod storage;

use crate::backup::backup_type::BackupType;
use crate::backup::file_util::ensure_writable_dir;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;

use bon::Builder;
use chrono::{DateTime, NaiveDate, Utc};
use getset::Getters;

use std::fmt::Debug;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    RawDump,
    EncryptedArchive,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::RawDump => "sql",
            ArtifactKind::EncryptedArchive => "zip",
        }
    }
}

/// A backup file on disk, handed from stage to stage until the uploader
/// deletes it
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct BackupArtifact {
    path: PathBuf,
    kind: ArtifactKind,
    size: u64,
}

impl BackupArtifact {
    pub fn from_path<P: Into<PathBuf>>(path: P, kind: ArtifactKind) -> Result<Self> {
        let path = std::path::absolute(path.into())?;
        let size = std::fs::metadata(&path)
            .map_err(Error::from)
            .with_msg(format!("Backup artifact {:?} is missing", path))?
            .len();
        Ok(Self { path, kind, size })
    }
}

/// `backup-<YYYY-MM-DD>.<sql|zip>`
pub fn artifact_file_name(kind: ArtifactKind, date: NaiveDate) -> String {
    format!("backup-{}.{}", date.format("%Y-%m-%d"), kind.extension())
}

/// Where artifacts are written
#[derive(Clone, Debug, Builder, Getters, PartialEq, Eq)]
#[getset(get = "pub")]
pub struct BackupLayout {
    #[builder(into)]
    backup_dir: PathBuf,
    #[builder(default = std::env::temp_dir(), into)]
    fallback_dir: PathBuf,
}

impl BackupLayout {
    /// The backup directory, created when missing, or the fallback directory
    /// when the backup directory cannot be written.
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        match ensure_writable_dir(&self.backup_dir) {
            Ok(()) => Ok(self.backup_dir.clone()),
            Err(e) => {
                tracing::warn!(
                    "Backup directory {:?} is not writable ({e}), falling back to {:?}",
                    self.backup_dir,
                    self.fallback_dir
                );
                ensure_writable_dir(&self.fallback_dir)
                    .map(|_| self.fallback_dir.clone())
                    .map_err(|e2| e.chain(e2))
                    .with_msg("No writable backup directory")
            }
        }
    }

    pub fn artifact_path(&self, dir: &Path, kind: ArtifactKind, now: DateTime<Utc>) -> PathBuf {
        dir.join(artifact_file_name(kind, now.date_naive()))
    }
}

/// Produces one artifact per call for the backup type it stands for
pub trait Snapshotter: Debug + Send + Sync {
    fn backup_type(&self) -> BackupType;

    fn create_snapshot(&self, now: DateTime<Utc>) -> Result<BackupArtifact>;
}
