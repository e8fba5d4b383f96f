use crate::backup::archive::cli::DEFAULT_ARCHIVER_BINARY;
use crate::backup::archive::{ExclusionRules, ZipStrategy};
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::snapshot::database::DatabaseConfig;
use crate::backup::snapshot::storage::StorageConfig;
use crate::backup::snapshot::BackupLayout;
use crate::backup::upload::UploadConfig;
use crate::backup::validate::{validate_backup_url, validate_cron_str, validate_not_a_file};

use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use validator::{Validate, ValidationError};

use std::fs::File;
use std::path::{Path, PathBuf};

fn default_archiver_binary() -> String {
    DEFAULT_ARCHIVER_BINARY.to_string()
}

fn default_excluded_files() -> ExclusionRules {
    ExclusionRules::new([".gitignore"])
}

fn default_excluded_tables() -> Vec<String> {
    vec!["cache".to_string()]
}

fn default_fallback_dir() -> PathBuf {
    std::env::temp_dir()
}

#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_storage_has_password))]
#[getset(get = "pub")]
pub struct BackupConfig {
    /// Token sent to the collector with every upload
    #[serde(default)]
    #[builder(default, into)]
    backup_code: RedactedString,
    #[validate(custom(function = validate_backup_url))]
    #[serde(default)]
    #[builder(default, into)]
    backup_url: String,
    /// Archive password. Database dumps are uploaded unencrypted without it.
    #[builder(into)]
    backup_zip_password: Option<RedactedString>,
    #[serde(default)]
    #[builder(default)]
    zip_strategy: ZipStrategy,
    #[serde(default = "default_archiver_binary")]
    #[builder(default = default_archiver_binary(), into)]
    archiver_binary: String,
    #[serde(default = "default_excluded_files")]
    #[builder(default = default_excluded_files(), into)]
    excluded_files: ExclusionRules,
    #[serde(default = "default_excluded_tables")]
    #[builder(default = default_excluded_tables(), into)]
    excluded_tables: Vec<String>,
    #[validate(custom(function = validate_not_a_file))]
    #[builder(into)]
    backup_dir: PathBuf,
    #[serde(default = "default_fallback_dir")]
    #[builder(default = default_fallback_dir(), into)]
    fallback_dir: PathBuf,
    #[validate(nested)]
    storage: Option<StorageConfig>,
    #[validate(nested)]
    database: Option<DatabaseConfig>,
    #[validate(nested)]
    #[serde(default)]
    #[builder(default)]
    upload: UploadConfig,
    /// Schedule used by the daemon
    #[validate(custom(function = validate_cron_str))]
    #[builder(into)]
    cron: Option<String>,
}

fn validate_storage_has_password(config: &BackupConfig) -> std::result::Result<(), ValidationError> {
    if config.storage.is_some() && !config.has_zip_password() {
        return Err(ValidationError::new("MissingZipPassword").with_message(
            "storage backups are always encrypted, set backup_zip_password".into(),
        ));
    }

    Ok(())
}

impl BackupConfig {
    /// Reads and validates the YAML configuration at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config: BackupConfig = File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader(f).map_err(Error::from))
            .with_msg(format!("Parse YAML config failed: {:?}", path))?;

        config
            .validate()
            .map_err(Error::from)
            .with_msg(format!("Config validation failed: {:?}", path))?;

        Ok(config)
    }

    pub fn has_zip_password(&self) -> bool {
        self.backup_zip_password
            .as_ref()
            .is_some_and(|password| !password.is_empty())
    }

    /// Names of the required settings that are empty.
    pub fn missing_variables(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.has_zip_password() {
            missing.push("BACKUP_ZIP_PASSWORD");
        }
        if self.backup_code.is_empty() {
            missing.push("BACKUP_CODE");
        }
        if self.backup_url.trim().is_empty() {
            missing.push("BACKUP_URL");
        }
        missing
    }

    pub fn layout(&self) -> BackupLayout {
        BackupLayout::builder()
            .backup_dir(self.backup_dir.clone())
            .fallback_dir(self.fallback_dir.clone())
            .build()
    }
}
