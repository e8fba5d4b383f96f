//! ZIP creation through the `7z` command line tool.

use crate::backup::archive::{ArchiveRequest, ZipCreator, ZipStrategy};
use crate::backup::file_util::{remove_if_exists, restrict_permissions};
use crate::backup::function_path;
use crate::backup::process::{CommandArg, Invocation, ProcessRunner};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;

use function_name::named;
use itertools::Itertools;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub static DEFAULT_ARCHIVER_BINARY: &str = "7z";
pub const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Clone, Debug)]
pub struct CliZipCreator {
    runner: Arc<dyn ProcessRunner>,
    binary: String,
    timeout: Duration,
}

impl CliZipCreator {
    pub fn new<S: Into<String>>(runner: Arc<dyn ProcessRunner>, binary: S) -> Self {
        Self {
            runner,
            binary: binary.into(),
            timeout: ARCHIVE_TIMEOUT,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn archive_invocation(&self, request: &ArchiveRequest, destination: &Path) -> Invocation {
        // A single file is added by name from its parent directory, a
        // directory is added recursively from inside it.
        let (working_dir, target) = match (request.source_is_file(), request.source().parent()) {
            (true, Some(parent)) => (
                parent.to_path_buf(),
                request
                    .source()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| ".".into()),
            ),
            _ => (request.source().clone(), ".".to_string()),
        };

        let mut args = vec![
            CommandArg::plain("a"),
            CommandArg::plain("-tzip"),
            CommandArg::plain("-mem=AES256"),
            CommandArg::secret("-p", request.password()),
            CommandArg::plain("-r"),
            CommandArg::plain("-bso0"),
            CommandArg::plain("-bsp0"),
            CommandArg::plain(destination.to_string_lossy()),
            CommandArg::plain(target),
        ];
        args.extend(
            request
                .exclusions()
                .iter()
                .map(|rule| CommandArg::plain(format!("-xr!{}", rule.trim_start_matches('/')))),
        );

        Invocation::builder()
            .program(self.binary.as_str())
            .args(args)
            .current_dir(working_dir)
            .timeout(self.timeout)
            .build()
    }

    fn count_files(&self, request: &ArchiveRequest, destination: &Path) -> Result<usize> {
        let invocation = Invocation::builder()
            .program(self.binary.as_str())
            .args(vec![
                CommandArg::plain("l"),
                CommandArg::secret("-p", request.password()),
                CommandArg::plain(destination.to_string_lossy()),
            ])
            .timeout(self.timeout)
            .build();
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(Error::ArchiveCreationFailed(format!(
                "listing {:?} failed: {}",
                destination,
                output.stderr.trim()
            )));
        }

        parse_listed_file_count(&output.stdout).ok_or_else(|| {
            Error::ArchiveCreationFailed(format!(
                "{} listing of {:?} has no file count",
                self.binary, destination
            ))
        })
    }

    fn create_archive(&self, request: &ArchiveRequest, destination: &Path) -> Result<usize> {
        let output = self
            .runner
            .run(&self.archive_invocation(request, destination))?;
        if !output.success() {
            return Err(Error::ArchiveCreationFailed(format!(
                "{} exited with {:?}: {}",
                self.binary,
                output.exit_code,
                output.stderr.trim()
            )));
        }
        // 7z exits successfully without writing anything when every file
        // was excluded.
        if !destination.exists() {
            return Err(Error::EmptyArchive(request.source().clone()));
        }

        match self.count_files(request, destination)? {
            0 => Err(Error::EmptyArchive(request.source().clone())),
            count => restrict_permissions(destination).map(|_| count),
        }
    }

    /// The tool creates its output with the process umask, so it writes into
    /// an owner-only staging directory next to `destination` and the result
    /// is moved into place once restricted.
    fn create_staged(&self, request: &ArchiveRequest, destination: &Path) -> Result<usize> {
        let (parent, file_name) = match (destination.parent(), destination.file_name()) {
            (Some(parent), Some(file_name)) => (parent, file_name),
            _ => {
                return Err(Error::InvalidArchiveRequest(format!(
                    "{:?} is not a file path",
                    destination
                )))
            }
        };
        let staging = tempfile::Builder::new()
            .prefix(".archive-staging")
            .tempdir_in(parent)
            .map_err(|e| {
                Error::ArchiveCreationFailed(format!("cannot stage archive in {:?}: {e}", parent))
            })?;
        let staged = staging.path().join(file_name);

        let count = self.create_archive(request, &staged)?;
        std::fs::rename(&staged, destination).map_err(|e| {
            Error::ArchiveCreationFailed(format!("cannot move archive to {:?}: {e}", destination))
        })?;
        Ok(count)
    }
}

impl ZipCreator for CliZipCreator {
    fn strategy(&self) -> ZipStrategy {
        ZipStrategy::Cli
    }

    fn is_available(&self) -> bool {
        self.runner.probe(&self.binary, &["--help"])
    }

    #[named]
    fn create(&self, request: &ArchiveRequest) -> Result<usize> {
        tracing::info!("Using CLI {} strategy for ZIP creation", self.binary);
        request.check()?;

        // The tool runs from inside the source, so the destination must not
        // depend on the current directory.
        let destination: PathBuf = std::path::absolute(request.destination())?;
        remove_if_exists(&destination)?;

        self.create_staged(request, &destination)
            .map_err(|mut e| {
                if let Err(e2) = remove_if_exists(&destination) {
                    e = e.chain(e2);
                }
                e
            })
            .with_debug_object_and_fn_name(request.clone(), function_path!())
    }
}

/// Extracts the integer in front of the `files` token of a `7z l` summary,
/// e.g. `2026-10-19 02:00:00   1024   512  3 files, 1 folders`.
pub fn parse_listed_file_count(listing: &str) -> Option<usize> {
    listing.lines().rev().find_map(|line| {
        line.split(|c: char| c.is_whitespace() || c == ',')
            .filter(|token| !token.is_empty())
            .tuple_windows()
            .find_map(|(count, token)| match token {
                "files" => count.parse().ok(),
                _ => None,
            })
    })
}
