use crate::backup::archive::manager::ZipManager;
use crate::backup::archive::{ArchiveRequest, ExclusionRules, ZipStrategy};
use crate::backup::backup_type::BackupType;
use crate::backup::function_path;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;
use crate::backup::snapshot::{ArtifactKind, BackupArtifact, BackupLayout, Snapshotter};

use bon::Builder;
use chrono::{DateTime, Utc};
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use validator::Validate;

use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct StorageConfig {
    /// Directory archived by a storage backup
    #[builder(into)]
    src_dir: PathBuf,
}

/// Archives the storage directory into an encrypted `backup-<date>.zip`.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct StorageSnapshotter {
    zip_manager: ZipManager,
    layout: BackupLayout,
    #[builder(into)]
    src_dir: PathBuf,
    #[builder(into)]
    password: RedactedString,
    #[builder(default, into)]
    exclusions: ExclusionRules,
    #[builder(default)]
    zip_strategy: ZipStrategy,
}

impl StorageSnapshotter {
    /// The source directory with symlinks resolved. A missing source, a
    /// dangling link or a plain file all count as not found.
    fn resolved_source(&self) -> Result<PathBuf> {
        match self.src_dir.canonicalize() {
            Ok(path) if path.is_dir() => Ok(path),
            _ => Err(Error::SourceNotFound(self.src_dir.clone())),
        }
    }

    fn archive(&self, now: DateTime<Utc>) -> Result<BackupArtifact> {
        let source = self.resolved_source()?;
        tracing::info!("Starting storage backup of {:?}", source);

        let dir = self.layout.resolve_dir()?;
        let destination = self
            .layout
            .artifact_path(&dir, ArtifactKind::EncryptedArchive, now);
        let request = ArchiveRequest::builder()
            .source(source)
            .destination(&destination)
            .password(self.password.clone())
            .exclusions(self.exclusions.clone())
            .build();

        let count = self.zip_manager.resolve(self.zip_strategy)?.create(&request)?;
        tracing::info!("ZIP archive {:?} created with {} files", destination, count);

        BackupArtifact::from_path(destination, ArtifactKind::EncryptedArchive)
    }
}

impl Snapshotter for StorageSnapshotter {
    fn backup_type(&self) -> BackupType {
        BackupType::Storage
    }

    #[named]
    fn create_snapshot(&self, now: DateTime<Utc>) -> Result<BackupArtifact> {
        self.archive(now)
            .with_debug_object_and_fn_name(self.src_dir.clone(), function_path!())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::library::LibraryZipCreator;
    use crate::backup::archive::manager::testing::FakeZipCreator;
    use chrono::TimeZone;
    use itertools::Itertools;
    use std::fs::File;
    use std::sync::Arc;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 3, 30, 0).unwrap()
    }

    fn library_only() -> ZipManager {
        ZipManager::new(
            Arc::new(FakeZipCreator {
                strategy: ZipStrategy::Cli,
                available: false,
            }),
            Arc::new(LibraryZipCreator),
        )
    }

    fn snapshotter(src_dir: PathBuf, backup_dir: PathBuf, exclusions: &[&str]) -> StorageSnapshotter {
        StorageSnapshotter::builder()
            .zip_manager(library_only())
            .layout(BackupLayout::builder().backup_dir(backup_dir).build())
            .src_dir(src_dir)
            .password("storage-pass")
            .exclusions(ExclusionRules::new(exclusions.iter().copied()))
            .build()
    }

    #[test]
    fn test_excluded_file_is_left_out() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(src.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(src.path().join("b.txt"), "beta").unwrap();

        let artifact = snapshotter(src.path().into(), out.path().into(), &["b.txt"])
            .create_snapshot(now())
            .unwrap();

        assert_eq!(artifact.kind(), &ArtifactKind::EncryptedArchive);
        assert_eq!(artifact.path(), &out.path().join("backup-2026-10-19.zip"));
        let mut archive = ZipArchive::new(File::open(artifact.path()).unwrap()).unwrap();
        assert_eq!(archive.file_names().collect_vec(), vec!["a.txt"]);
        assert!(archive.by_name_decrypt("a.txt", b"storage-pass").is_ok());
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let out = TempDir::new().unwrap();
        let missing = out.path().join("does-not-exist");

        let err = snapshotter(missing.clone(), out.path().into(), &[])
            .create_snapshot(now())
            .unwrap_err();

        assert!(matches!(err.root(), Error::SourceNotFound(p) if p == &missing));
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_file_source_is_not_found() {
        let out = TempDir::new().unwrap();
        let file = out.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let err = snapshotter(file, out.path().join("backups"), &[])
            .create_snapshot(now())
            .unwrap_err();

        assert!(matches!(err.root(), Error::SourceNotFound(_)));
    }

    #[test]
    #[cfg(unix)]
    fn test_dangling_symlink_source_is_not_found() {
        let out = TempDir::new().unwrap();
        let link = out.path().join("storage");
        std::os::unix::fs::symlink(out.path().join("gone"), &link).unwrap();

        let err = snapshotter(link, out.path().join("backups"), &[])
            .create_snapshot(now())
            .unwrap_err();

        assert!(matches!(err.root(), Error::SourceNotFound(_)));
        assert!(!out.path().join("backups").exists());
    }

    #[test]
    fn test_empty_source_fails_without_artifact() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(src.path().join(".gitignore"), "*").unwrap();

        let err = snapshotter(src.path().into(), out.path().into(), &[".gitignore"])
            .create_snapshot(now())
            .unwrap_err();

        assert!(matches!(err.root(), Error::EmptyArchive(_)));
        assert!(!out.path().join("backup-2026-10-19.zip").exists());
    }

    #[test]
    fn test_storage_config_deserialize() {
        let config: StorageConfig = serde_yml::from_str("src_dir: /srv/app/storage").unwrap();
        assert_eq!(config.src_dir(), &PathBuf::from("/srv/app/storage"));
        assert!(serde_yml::from_str::<StorageConfig>("src_dir: /a\nextra: 1").is_err());
    }
}
