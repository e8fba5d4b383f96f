//! Database snapshots through an external dump tool (`mysqldump`).

use crate::backup::archive::manager::ZipManager;
use crate::backup::archive::{ArchiveRequest, ZipStrategy};
use crate::backup::backup_type::BackupType;
use crate::backup::file_util::{remove_if_exists, RemoveOnDrop};
use crate::backup::function_path;
use crate::backup::process::{CommandArg, Invocation, ProcessRunner};
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithFnName;
use crate::backup::snapshot::{ArtifactKind, BackupArtifact, BackupLayout, Snapshotter};

use bon::Builder;
use chrono::{DateTime, Utc};
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use validator::Validate;

use std::path::Path;
use std::sync::Arc;

/// Environment variable the dump tool reads the password from, keeping it
/// out of the process listing.
pub static PASSWORD_ENV: &str = "MYSQL_PWD";

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3306
}

fn default_dump_binary() -> String {
    "mysqldump".into()
}

/// Connection parameters of the database to dump
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    #[builder(default = default_host(), into)]
    host: String,
    #[serde(default = "default_port")]
    #[builder(default = default_port())]
    port: u16,
    #[validate(length(min = 1))]
    #[builder(into)]
    username: String,
    #[serde(default)]
    #[builder(default, into)]
    password: RedactedString,
    #[validate(length(min = 1))]
    #[builder(into)]
    database: String,
    #[serde(default = "default_dump_binary")]
    #[builder(default = default_dump_binary(), into)]
    dump_binary: String,
}

/// Dumps the database to `backup-<date>.sql` and, when a password is set,
/// replaces the dump with an encrypted `backup-<date>.zip`.
#[derive(Clone, Debug, Builder)]
pub struct DatabaseSnapshotter {
    runner: Arc<dyn ProcessRunner>,
    zip_manager: ZipManager,
    layout: BackupLayout,
    source: DatabaseConfig,
    #[builder(default, into)]
    excluded_tables: Vec<String>,
    password: Option<RedactedString>,
    #[builder(default)]
    zip_strategy: ZipStrategy,
}

impl DatabaseSnapshotter {
    pub fn dump_invocation(&self, result_file: &Path) -> Invocation {
        let source = &self.source;
        let mut args = vec![
            CommandArg::plain("--no-tablespaces"),
            CommandArg::plain("--single-transaction"),
            CommandArg::plain("--quick"),
            CommandArg::plain(format!("--user={}", source.username)),
            CommandArg::plain(format!("--port={}", source.port)),
            CommandArg::plain(format!("--host={}", source.host)),
        ];
        args.extend(self.excluded_tables.iter().map(|table| {
            CommandArg::plain(format!("--ignore-table={}.{}", source.database, table))
        }));
        args.push(CommandArg::plain(format!(
            "--result-file={}",
            result_file.to_string_lossy()
        )));
        args.push(CommandArg::plain(source.database.as_str()));

        Invocation::builder()
            .program(source.dump_binary.as_str())
            .args(args)
            .env(vec![(PASSWORD_ENV.to_string(), source.password.clone())])
            .build()
    }

    fn dump_and_encrypt(&self, now: DateTime<Utc>) -> Result<BackupArtifact> {
        tracing::info!("Starting database backup of {:?}", self.source.database);
        let dir = self.layout.resolve_dir()?;
        let dump_path = self.layout.artifact_path(&dir, ArtifactKind::RawDump, now);
        remove_if_exists(&dump_path)?;

        // Removes a partial or superseded dump on every exit path but the
        // one returning the raw dump itself.
        let dump = RemoveOnDrop::new(dump_path);

        tracing::info!("Creating backup file {:?}", dump.path());
        let output = self.runner.run(&self.dump_invocation(dump.path()))?;
        if !output.success() {
            tracing::error!(
                exit_code = ?output.exit_code,
                "{} failed: {}",
                self.source.dump_binary,
                output.stderr.trim()
            );
            return Err(Error::DumpFailed {
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let password = match &self.password {
            Some(password) if !password.is_empty() => password,
            _ => {
                tracing::warn!("No archive password configured, uploading the SQL dump unencrypted");
                return BackupArtifact::from_path(dump.keep(), ArtifactKind::RawDump);
            }
        };

        let zip_path = self
            .layout
            .artifact_path(&dir, ArtifactKind::EncryptedArchive, now);
        let request = ArchiveRequest::builder()
            .source(dump.path())
            .destination(&zip_path)
            .password(password.clone())
            .build();
        self.zip_manager
            .resolve(self.zip_strategy)?
            .create(&request)?;
        drop(dump);
        tracing::info!("SQL dump encrypted into ZIP archive {:?}", zip_path);

        BackupArtifact::from_path(zip_path, ArtifactKind::EncryptedArchive)
    }
}

impl Snapshotter for DatabaseSnapshotter {
    fn backup_type(&self) -> BackupType {
        BackupType::Database
    }

    #[named]
    fn create_snapshot(&self, now: DateTime<Utc>) -> Result<BackupArtifact> {
        self.dump_and_encrypt(now).with_fn_name(function_path!())
    }
}
