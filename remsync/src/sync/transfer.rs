use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use remsync_core::TransferLink;
use reqwest::{Client, Method, RequestBuilder, Response};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// Appended to the file name of a download in progress. Paths carrying it
/// are never synchronized.
pub const PARTIAL_SUFFIX: &str = ".remsync-partial";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("download integrity check failed: expected {expected_md5}, got {actual_md5}")]
    IntegrityMismatch {
        expected_md5: String,
        actual_md5: String,
    },
}

/// Moves file bodies through the transfer links handed out by the remote API.
#[derive(Clone, Default)]
pub struct TransferClient {
    http: Client,
}

impl TransferClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransferError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Fetches `link` into a staging file next to `target`; `target` is only
    /// replaced once the body is complete and matches `expected_md5`.
    pub async fn download(
        &self,
        link: &TransferLink,
        target: &Path,
        expected_md5: Option<&str>,
    ) -> Result<(), TransferError> {
        let response = self.request(link, Method::GET).send().await?.error_for_status()?;
        let staging = partial_path(target);
        let digest = match write_body(response, &staging).await {
            Ok(digest) => digest,
            Err(err) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(err);
            }
        };
        if let Some(expected) = expected_md5.map(str::to_ascii_lowercase)
            && expected != digest
        {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(TransferError::IntegrityMismatch {
                expected_md5: expected,
                actual_md5: digest,
            });
        }
        tokio::fs::rename(&staging, target).await?;
        Ok(())
    }

    pub async fn upload(&self, link: &TransferLink, source: &Path) -> Result<(), TransferError> {
        let file = tokio::fs::File::open(source).await?;
        let length = file.metadata().await?.len();
        self.request(link, Method::PUT)
            .header(reqwest::header::CONTENT_LENGTH, length)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn request(&self, link: &TransferLink, fallback: Method) -> RequestBuilder {
        let method = Method::from_bytes(link.method.to_ascii_uppercase().as_bytes())
            .unwrap_or(fallback);
        self.http.request(method, link.href.clone())
    }
}

/// Streams the body into `staging` and returns its md5 as lowercase hex.
async fn write_body(response: Response, staging: &Path) -> Result<String, TransferError> {
    if let Some(parent) = staging.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(staging).await?;
    let mut digest = md5::Context::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.sync_all().await?;
    Ok(format!("{:x}", digest.compute()))
}

pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

pub fn is_partial_download(path: &str) -> bool {
    path.ends_with(PARTIAL_SUFFIX)
}
