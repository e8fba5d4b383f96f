//! Environment diagnostics behind the `check` command.

use crate::backup::archive::manager::ZipManager;
use crate::backup::backup_config::BackupConfig;
use crate::backup::file_util::is_writable_dir;
use crate::backup::process::{CommandArg, Invocation, ProcessRunner, SystemProcessRunner};
use crate::backup::result_error::result::Result;
use crate::backup::upload::transport::{HttpTransport, Transport};
use crate::backup::upload::{parse_secure_endpoint, redact_url};

use bon::Builder;
use derive_more::Display;
use url::Url;

use std::fmt::Formatter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum CheckStatus {
    #[display("OK")]
    Ok,
    #[display("WARN")]
    Warning,
    #[display("FAIL")]
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckItem {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckItem {
    fn new<N: Into<String>, D: Into<String>>(name: N, status: CheckStatus, detail: D) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub items: Vec<CheckItem>,
}

impl CheckReport {
    /// Warnings do not fail the report.
    pub fn is_ok(&self) -> bool {
        self.items.iter().all(|item| item.status != CheckStatus::Failed)
    }

    pub fn item(&self, name: &str) -> Option<&CheckItem> {
        self.items.iter().find(|item| item.name == name)
    }
}

impl std::fmt::Display for CheckReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for item in &self.items {
            writeln!(f, "[{}] {}: {}", item.status, item.name, item.detail)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Builder)]
pub struct HealthCheck {
    config: BackupConfig,
    runner: Arc<dyn ProcessRunner>,
    zip_manager: ZipManager,
    transport: Arc<dyn Transport>,
}

impl HealthCheck {
    pub fn system(config: &BackupConfig) -> Result<Self> {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemProcessRunner);
        Ok(HealthCheck::builder()
            .config(config.clone())
            .zip_manager(ZipManager::system(runner.clone(), config.archiver_binary().as_str()))
            .runner(runner)
            .transport(Arc::new(HttpTransport::new(PROBE_TIMEOUT)?))
            .build())
    }

    pub fn run(&self) -> CheckReport {
        let mut report = CheckReport::default();
        self.check_variables(&mut report);
        self.check_directories(&mut report);
        self.check_dump_tool(&mut report);
        self.check_zip(&mut report);
        self.check_endpoint(&mut report);
        report
    }

    fn check_variables(&self, report: &mut CheckReport) {
        let config = &self.config;
        let missing = config.missing_variables();
        let mut variable = |name: &'static str, shown: String| {
            if missing.contains(&name) {
                report
                    .items
                    .push(CheckItem::new(name, CheckStatus::Failed, "not set"));
            } else {
                report.items.push(CheckItem::new(name, CheckStatus::Ok, shown));
            }
        };

        variable(
            "BACKUP_ZIP_PASSWORD",
            config
                .backup_zip_password()
                .as_ref()
                .map(|password| password.masked())
                .unwrap_or_default(),
        );
        variable("BACKUP_CODE", config.backup_code().masked());
        variable(
            "BACKUP_URL",
            Url::parse(config.backup_url())
                .map(|url| redact_url(&url))
                .unwrap_or_else(|_| config.backup_url().clone()),
        );
    }

    fn check_directories(&self, report: &mut CheckReport) {
        let backup_dir = self.config.backup_dir();
        report.items.push(if is_writable_dir(backup_dir) {
            CheckItem::new("backup_dir", CheckStatus::Ok, format!("{:?} is writable", backup_dir))
        } else if !backup_dir.exists() {
            CheckItem::new(
                "backup_dir",
                CheckStatus::Warning,
                format!("{:?} does not exist yet, it is created on the first run", backup_dir),
            )
        } else {
            CheckItem::new(
                "backup_dir",
                CheckStatus::Warning,
                format!(
                    "{:?} is not writable, falling back to {:?}",
                    backup_dir,
                    self.config.fallback_dir()
                ),
            )
        });

        if let Some(storage) = self.config.storage() {
            report.items.push(source_dir_item(storage.src_dir()));
        }
    }

    fn check_dump_tool(&self, report: &mut CheckReport) {
        let Some(database) = self.config.database() else {
            return;
        };

        let invocation = Invocation::builder()
            .program(database.dump_binary().as_str())
            .args(vec![CommandArg::plain("--version")])
            .timeout(PROBE_TIMEOUT)
            .build();
        let item = match self.runner.run(&invocation) {
            Ok(output) if output.success() => CheckItem::new(
                "dump_tool",
                CheckStatus::Ok,
                output.stdout.lines().next().unwrap_or_default().trim(),
            ),
            Ok(output) => CheckItem::new(
                "dump_tool",
                CheckStatus::Failed,
                format!("{} --version failed: {}", database.dump_binary(), output.stderr.trim()),
            ),
            Err(e) => CheckItem::new(
                "dump_tool",
                CheckStatus::Failed,
                format!("{} is not installed: {e}", database.dump_binary()),
            ),
        };
        report.items.push(item);
    }

    fn check_zip(&self, report: &mut CheckReport) {
        let (cli, library) = self.zip_manager.availability();
        let available = |yes: bool| if yes { CheckStatus::Ok } else { CheckStatus::Warning };
        report.items.push(CheckItem::new(
            "zip_cli",
            available(cli),
            if cli { "available" } else { "not installed" },
        ));
        report.items.push(CheckItem::new(
            "zip_library",
            available(library),
            if library { "available" } else { "not available" },
        ));

        let preference = *self.config.zip_strategy();
        report.items.push(match self.zip_manager.resolve(preference) {
            Ok(creator) => CheckItem::new(
                "zip_strategy",
                CheckStatus::Ok,
                format!("{} (configured: {})", creator.strategy(), preference),
            ),
            Err(e) => CheckItem::new("zip_strategy", CheckStatus::Failed, e.to_string()),
        });
    }

    fn check_endpoint(&self, report: &mut CheckReport) {
        let endpoint = self.config.backup_url();
        if endpoint.trim().is_empty() {
            return;
        }

        let origin = parse_secure_endpoint(endpoint).and_then(|url| {
            Ok(Url::parse(&url.origin().ascii_serialization())?)
        });
        let item = match origin {
            Ok(origin) => match self.transport.head(&origin) {
                Ok(status) if status < 500 => CheckItem::new(
                    "backup_url",
                    CheckStatus::Ok,
                    format!("{} is reachable (HTTP {status})", origin),
                ),
                Ok(status) => CheckItem::new(
                    "backup_url",
                    CheckStatus::Failed,
                    format!("{} answered HTTP {status}", origin),
                ),
                Err(e) => CheckItem::new(
                    "backup_url",
                    CheckStatus::Failed,
                    format!("{} is not reachable: {e}", origin),
                ),
            },
            Err(e) => CheckItem::new("backup_url", CheckStatus::Failed, e.to_string()),
        };
        report.items.push(item);
    }
}

fn source_dir_item(src_dir: &Path) -> CheckItem {
    match src_dir.canonicalize() {
        Ok(path) if path.is_dir() && std::fs::read_dir(&path).is_ok() => CheckItem::new(
            "storage_src_dir",
            CheckStatus::Ok,
            format!("{:?} is readable", path),
        ),
        _ => CheckItem::new(
            "storage_src_dir",
            CheckStatus::Failed,
            format!("{:?} does not exist or is not a readable directory", src_dir),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::library::LibraryZipCreator;
    use crate::backup::archive::manager::testing::FakeZipCreator;
    use crate::backup::archive::ZipStrategy;
    use crate::backup::process::testing::{exit, ScriptedRunner};
    use crate::backup::result_error::error::Error;
    use crate::backup::upload::transport::testing::ScriptedTransport;
    use tempfile::TempDir;

    fn config(backup_dir: &Path, extra: &str) -> BackupConfig {
        serde_yml::from_str(&format!(
            "backup_code: tok-123456789\n\
             backup_url: https://collector.example.com/api/backup\n\
             backup_zip_password: zip-pass\n\
             backup_dir: {}\n{extra}",
            backup_dir.display()
        ))
        .unwrap()
    }

    fn health_check(config: BackupConfig, runner: ScriptedRunner, head_status: Option<u16>) -> HealthCheck {
        HealthCheck::builder()
            .config(config)
            .runner(Arc::new(runner))
            .zip_manager(ZipManager::new(
                Arc::new(FakeZipCreator {
                    strategy: ZipStrategy::Cli,
                    available: false,
                }),
                Arc::new(LibraryZipCreator),
            ))
            .transport(Arc::new(ScriptedTransport {
                head_status,
                ..ScriptedTransport::default()
            }))
            .build()
    }

    fn mysqldump_ok() -> ScriptedRunner {
        ScriptedRunner::new(|_| Ok(exit(0, "mysqldump  Ver 8.0.36 for Linux\n", "")))
    }

    #[test]
    fn test_healthy_environment() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(
            temp_dir.path(),
            "database:\n  username: backup\n  database: shop\n",
        );

        let report = health_check(config, mysqldump_ok(), Some(405)).run();

        assert!(report.is_ok(), "{report}");
        assert_eq!(report.item("BACKUP_CODE").unwrap().detail, "tok*******789");
        assert_eq!(report.item("dump_tool").unwrap().detail, "mysqldump  Ver 8.0.36 for Linux");
        assert_eq!(report.item("zip_cli").unwrap().status, CheckStatus::Warning);
        assert_eq!(report.item("zip_strategy").unwrap().detail, "library (configured: auto)");
        assert_eq!(report.item("backup_url").unwrap().status, CheckStatus::Ok);
        assert!(!report.to_string().contains("zip-pass"));
    }

    #[test]
    fn test_missing_values_and_tools_fail() {
        let temp_dir = TempDir::new().unwrap();
        let config: BackupConfig = serde_yml::from_str(&format!(
            "backup_dir: {}\ndatabase:\n  username: backup\n  database: shop\n",
            temp_dir.path().display()
        ))
        .unwrap();
        let runner = ScriptedRunner::new(|_| {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory",
            )))
        });

        let report = health_check(config, runner, None).run();

        assert!(!report.is_ok());
        for name in ["BACKUP_ZIP_PASSWORD", "BACKUP_CODE", "BACKUP_URL", "dump_tool"] {
            assert_eq!(report.item(name).unwrap().status, CheckStatus::Failed, "{name}");
        }
        assert!(report.item("backup_url").is_none());
    }

    #[test]
    fn test_unreachable_or_failing_endpoint() {
        let temp_dir = TempDir::new().unwrap();

        let report = health_check(config(temp_dir.path(), ""), mysqldump_ok(), None).run();
        assert_eq!(report.item("backup_url").unwrap().status, CheckStatus::Failed);

        let report = health_check(config(temp_dir.path(), ""), mysqldump_ok(), Some(503)).run();
        assert_eq!(report.item("backup_url").unwrap().status, CheckStatus::Failed);
        assert!(report.item("dump_tool").is_none());
    }

    #[test]
    fn test_missing_storage_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(
            temp_dir.path(),
            &format!("storage:\n  src_dir: {}\n", temp_dir.path().join("gone").display()),
        );

        let report = health_check(config, mysqldump_ok(), Some(200)).run();

        assert_eq!(report.item("storage_src_dir").unwrap().status, CheckStatus::Failed);
        assert_eq!(report.item("backup_dir").unwrap().status, CheckStatus::Ok);
    }

    #[test]
    fn test_insecure_endpoint_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config: BackupConfig = serde_yml::from_str(&format!(
            "backup_code: tok-123456789\nbackup_url: http://insecure.example.com\n\
             backup_zip_password: zip-pass\nbackup_dir: {}\n",
            temp_dir.path().display()
        ))
        .unwrap();

        let report = health_check(config, mysqldump_ok(), Some(200)).run();

        assert_eq!(report.item("backup_url").unwrap().status, CheckStatus::Failed);
    }
}
