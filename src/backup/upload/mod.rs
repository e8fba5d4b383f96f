//! Upload of backup artifacts to the remote collector.
//!
//! The uploader checks the endpoint, hashes the artifact once, then posts it
//! up to `max_attempts` times, reopening the file for every attempt. Only
//! transport failures are retried. The artifact is deleted exactly once when
//! `send` returns, whatever the outcome.

pub mod transport;

use crate::backup::backup_type::BackupType;
use crate::backup::file_util::remove_if_exists;
use crate::backup::function_path;
use crate::backup::redacted::{RedactedString, REDACTED};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithFnName;
use crate::backup::snapshot::BackupArtifact;
use crate::backup::upload::transport::{Transport, TransportResponse, UploadRequest};

use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use validator::Validate;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct UploadConfig {
    #[validate(range(min = 1))]
    #[serde(default = "default_max_attempts")]
    #[builder(default = default_max_attempts())]
    max_attempts: u32,
    /// Pause between two attempts
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    #[builder(default = default_retry_delay())]
    retry_delay: Duration,
    /// Per-attempt network timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    #[builder(default = default_timeout())]
    timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig::builder().build()
    }
}

/// How an upload ended. The artifact is gone in every case.
#[derive(Debug)]
pub enum UploadOutcome {
    Sent {
        attempts: u32,
        size: u64,
        elapsed: Duration,
    },
    /// The collector answered with a non-success status. Not retried.
    Rejected { status: u16, body: String },
    /// No answer after the last attempt, or the artifact could not be read.
    Failed { attempts: u32, error: Error },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Sent { .. })
    }

    pub fn into_error(self) -> Option<Error> {
        match self {
            UploadOutcome::Sent { .. } => None,
            UploadOutcome::Rejected { status, body } => Some(Error::UploadFailed { status, body }),
            UploadOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// Deletes the artifact file exactly once, on `finish` or on drop.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: PathBuf,
    removed: bool,
}

impl ArtifactGuard {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn finish(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match remove_if_exists(&self.path) {
            Ok(_) => tracing::info!("Backup file cleaned up: {:?}", self.path),
            Err(e) => tracing::error!("Failed to clean up backup file {:?}: {e}", self.path),
        }
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Lowercase hex SHA-256 of the file content.
pub fn file_checksum<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// The URL with any user info and query string replaced, fit for logs.
pub fn redact_url(url: &Url) -> String {
    let mut redacted = url.clone();
    if !redacted.username().is_empty() {
        let _ = redacted.set_username(REDACTED);
    }
    if redacted.password().is_some() {
        let _ = redacted.set_password(Some(REDACTED));
    }
    if redacted.query().is_some() {
        redacted.set_query(Some(REDACTED));
    }
    redacted.to_string()
}

const MAX_RESPONSE_BODY_CHARS: usize = 512;

/// The collector's answer with the token masked and cut to a bounded length,
/// fit for logs and error messages.
pub fn loggable_body(body: &str, token: &RedactedString) -> String {
    let masked = match token.inner().as_str() {
        "" => body.to_string(),
        secret => body.replace(secret, REDACTED),
    };
    match masked.char_indices().nth(MAX_RESPONSE_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &masked[..cut]),
        None => masked,
    }
}

/// Parses `endpoint` and requires the `https` scheme.
pub fn parse_secure_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)?;
    if url.scheme() != "https" {
        return Err(Error::InsecureEndpoint(redact_url(&url)));
    }
    Ok(url)
}

#[derive(Clone, Debug)]
pub struct Uploader {
    transport: Arc<dyn Transport>,
    policy: UploadConfig,
}

impl Uploader {
    pub fn new(transport: Arc<dyn Transport>, policy: UploadConfig) -> Self {
        Self { transport, policy }
    }

    /// Sends the artifact and deletes it afterwards.
    ///
    /// Only an unusable endpoint is returned as an error. Every failure after
    /// that point is logged and reported through `UploadOutcome`.
    #[named]
    pub fn send(
        &self,
        artifact: &BackupArtifact,
        backup_type: BackupType,
        token: &RedactedString,
        endpoint: &str,
    ) -> Result<UploadOutcome> {
        let guard = ArtifactGuard::new(artifact.path());
        let url = parse_secure_endpoint(endpoint).with_fn_name(function_path!())?;

        let outcome = self.send_with_retries(guard.path(), *artifact.size(), backup_type, token, &url);
        match &outcome {
            UploadOutcome::Sent { attempts, size, elapsed } => tracing::info!(
                "Backup file sent ({} bytes) in {:?} after {} attempt(s)",
                size,
                elapsed,
                attempts
            ),
            UploadOutcome::Rejected { status, body } => tracing::error!(
                "Backup upload to {} rejected with status {}: {}",
                redact_url(&url),
                status,
                body
            ),
            UploadOutcome::Failed { attempts, error } => tracing::error!(
                "Backup upload to {} failed after {} attempt(s): {}",
                redact_url(&url),
                attempts,
                error
            ),
        }

        guard.finish();
        Ok(outcome)
    }

    fn send_with_retries(
        &self,
        path: &Path,
        size: u64,
        backup_type: BackupType,
        token: &RedactedString,
        url: &Url,
    ) -> UploadOutcome {
        let started = Instant::now();
        let checksum = match file_checksum(path) {
            Ok(checksum) => checksum,
            Err(error) => return UploadOutcome::Failed { attempts: 0, error },
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{backup_type}"));
        let request = UploadRequest {
            endpoint: url,
            token,
            checksum: &checksum,
            backup_type,
            file_name: &file_name,
            size,
        };

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::info!("Sending {:?}, attempt {}/{}", path, attempt, max_attempts);

            let result = File::open(path)
                .map_err(Error::from)
                .and_then(|body| self.transport.post(&request, body));

            match result {
                Ok(TransportResponse { status, body }) if (200..300).contains(&status) => {
                    tracing::debug!("Collector answered {status}: {}", loggable_body(&body, token));
                    return UploadOutcome::Sent {
                        attempts: attempt,
                        size,
                        elapsed: started.elapsed(),
                    };
                }
                Ok(TransportResponse { status, body }) => {
                    return UploadOutcome::Rejected {
                        status,
                        body: loggable_body(&body, token),
                    };
                }
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        "Attempt {attempt} to {} failed, retrying in {:?}: {error}",
                        redact_url(url),
                        self.policy.retry_delay
                    );
                    std::thread::sleep(self.policy.retry_delay);
                }
                Err(error) => {
                    return UploadOutcome::Failed {
                        attempts: attempt,
                        error,
                    };
                }
            }
        }
    }
}
