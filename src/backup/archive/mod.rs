pub mod cli;
pub mod library;
pub mod manager;
pub mod walk;

use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;

use bon::Builder;
use derive_more::{Display, From};
use getset::Getters;
use serde::{Deserialize, Serialize};

use std::fmt::Debug;
use std::path::PathBuf;

/// Which archive strategy to use
///
/// - Auto: the `7z` command line tool when installed, the zip library otherwise
/// - Cli: only the `7z` command line tool
/// - Library: only the in-process zip library
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ZipStrategy {
    #[default]
    #[display("auto")]
    Auto,
    #[display("cli")]
    Cli,
    #[display("library")]
    Library,
}

/// Relative paths (or path prefixes) left out of an archive
///
/// A rule matches an entry when the entry's relative path equals the rule or
/// starts with the rule followed by `/`. Rules are compared verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, From)]
#[serde(transparent)]
pub struct ExclusionRules {
    rules: Vec<String>,
}

impl ExclusionRules {
    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rules: rules.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        self.rules.iter().any(|rule| rule_matches(rule, relative_path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub fn rule_matches(rule: &str, relative_path: &str) -> bool {
    match relative_path.strip_prefix(rule) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Immutable input of a single archive creation
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct ArchiveRequest {
    /// File or directory to archive
    #[builder(into)]
    source: PathBuf,
    /// Archive file to write, replaced when it already exists
    #[builder(into)]
    destination: PathBuf,
    #[builder(into)]
    password: RedactedString,
    #[builder(default, into)]
    exclusions: ExclusionRules,
}

impl ArchiveRequest {
    /// Checks the preconditions every strategy shares.
    pub fn check(&self) -> Result<()> {
        if self.password.is_empty() {
            return Err(Error::InvalidArchiveRequest(
                "archive password must not be empty".into(),
            ));
        }
        if std::fs::metadata(&self.source).is_err() {
            return Err(Error::SourceNotFound(self.source.clone()));
        }
        Ok(())
    }

    pub fn source_is_file(&self) -> bool {
        self.source.is_file()
    }
}

/// A way of producing a password protected, AES-256 encrypted ZIP archive
///
/// Implementations are stateless and may be called any number of times.
pub trait ZipCreator: Debug + Send + Sync {
    fn strategy(&self) -> ZipStrategy;

    /// Whether this strategy can run in the current environment.
    fn is_available(&self) -> bool;

    /// Writes the archive and returns the number of files stored in it.
    /// Directories are not counted.
    fn create(&self, request: &ArchiveRequest) -> Result<usize>;
}
