//! HTTP transport for backup uploads.

use crate::backup::backup_type::BackupType;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::header::HeaderValue;
use url::Url;

use std::fmt::Debug;
use std::fs::File;
use std::time::Duration;

pub static TOKEN_HEADER: &str = "X-Notifier-Token";
pub static CHECKSUM_HEADER: &str = "X-Backup-Checksum";
pub static FILE_FIELD: &str = "backup_file";
pub static TYPE_FIELD: &str = "backup_type";

/// Everything sent with one upload attempt except the file body
#[derive(Clone, Debug)]
pub struct UploadRequest<'a> {
    pub endpoint: &'a Url,
    pub token: &'a RedactedString,
    pub checksum: &'a str,
    pub backup_type: BackupType,
    pub file_name: &'a str,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends bytes to the backup endpoint
///
/// Any HTTP answer is returned as a `TransportResponse`; only failures to
/// get an answer at all are `Error::Transport`.
pub trait Transport: Debug + Send + Sync {
    /// One multipart POST carrying `body` as the `backup_file` field.
    fn post(&self, request: &UploadRequest<'_>, body: File) -> Result<TransportResponse>;

    /// Status code of a HEAD request to `url`.
    fn head(&self, url: &Url) -> Result<u16>;
}

/// `Transport` over a blocking `reqwest` client with a per-request timeout
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport_error)?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post(&self, request: &UploadRequest<'_>, body: File) -> Result<TransportResponse> {
        let mut token = HeaderValue::from_str(request.token.inner())
            .map_err(|_| Error::Config("backup code is not a valid header value".into()))?;
        token.set_sensitive(true);

        let part = Part::reader_with_length(body, request.size)
            .file_name(request.file_name.to_string());
        let form = Form::new()
            .part(FILE_FIELD, part)
            .text(TYPE_FIELD, request.backup_type.as_str());

        let response = self
            .client
            .post(request.endpoint.clone())
            .header(TOKEN_HEADER, token)
            .header(CHECKSUM_HEADER, request.checksum)
            .multipart(form)
            .send()
            .map_err(transport_error)?;

        // The status line is the collector's answer. A body that fails to
        // arrive afterwards must not turn it into a retryable failure.
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_else(|e| {
            tracing::warn!(
                "Failed to read response body after status {}: {}",
                status,
                e.without_url()
            );
            String::new()
        });
        Ok(TransportResponse { status, body })
    }

    fn head(&self, url: &Url) -> Result<u16> {
        self.client
            .head(url.clone())
            .send()
            .map(|response| response.status().as_u16())
            .map_err(transport_error)
    }
}

/// The URL is dropped from the message since it may carry credentials.
fn transport_error(e: reqwest::Error) -> Error {
    Error::Transport(e.without_url().to_string())
}
