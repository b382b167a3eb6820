use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use thiserror::Error;

use super::backoff::RetryPolicy;
use super::executor::{SyncExecutor, SyncResult};
use super::item::{ItemError, SyncItem, SyncItems};
use super::local::{LocalError, LocalTree};
use super::pairing::pair_files;
use super::remote::{RemoteFiles, RemoteFilesError};
use super::timestamps::{TimestampError, TimestampStore};
use super::transfer::is_partial_download;
use super::transfer_file::TransferFile;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cannot list remote files: {0}")]
    RemoteListing(RemoteFilesError),
    #[error("cannot list local files: {0}")]
    LocalListing(#[from] LocalError),
    #[error("timestamp store error: {0}")]
    Timestamp(#[from] TimestampError),
    #[error("invalid sync item: {0}")]
    Item(#[from] ItemError),
    #[error("{} item(s) must be resolved before synchronizing", .0.len())]
    Blocked(Vec<(String, String)>),
}

/// Drives one project: builds the plan and hands confirmed plans to the
/// executor.
pub struct SyncController<R> {
    remote: R,
    local: LocalTree,
    timestamps: TimestampStore,
    retry: RetryPolicy,
}

impl<R: RemoteFiles> SyncController<R> {
    pub fn new(remote: R, local: LocalTree, timestamps: TimestampStore) -> Self {
        Self {
            remote,
            local,
            timestamps,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn local(&self) -> &LocalTree {
        &self.local
    }

    pub fn timestamps(&self) -> &TimestampStore {
        &self.timestamps
    }

    /// Lists both sides and infers an operation for every path.
    pub async fn prepare(&self) -> Result<SyncItems, SyncError> {
        let remote = without_partial_downloads(self.list_remote().await?);
        let local = without_partial_downloads(self.local.list().await?);
        tracing::info!(remote = remote.len(), local = local.len(), "listed files");

        let mut last_syncs: HashMap<String, Option<i64>> = HashMap::new();
        let mut items = Vec::new();
        for pair in pair_files(remote, local) {
            let Some(file) = pair.local.as_ref().or(pair.remote.as_ref()) else {
                continue;
            };
            let last_sync = self.last_sync_of(file, &mut last_syncs).await?;
            items.push(SyncItem::new(pair.remote, pair.local, last_sync)?);
        }
        let items = SyncItems::new(items);
        tracing::debug!(items = items.len(), "sync plan prepared");
        Ok(items)
    }

    /// Runs `items` unless any of them still validates with an error.
    pub async fn synchronize(
        &self,
        items: &SyncItems,
        cancel: Arc<AtomicBool>,
    ) -> Result<SyncResult, SyncError> {
        let errors = items.errors();
        if !errors.is_empty() {
            for (path, message) in &errors {
                tracing::warn!(path = %path, reason = %message, "blocking synchronization");
            }
            return Err(SyncError::Blocked(errors));
        }
        let executor = SyncExecutor::new(&self.remote, &self.local, &self.timestamps, cancel);
        let result = executor.run(items.iter()).await;
        tracing::info!(
            downloaded = result.download.transferred.len(),
            uploaded = result.upload.transferred.len(),
            deleted = result.delete.transferred.len(),
            cancelled = result.cancelled,
            "synchronization finished"
        );
        Ok(result)
    }

    /// Closes the remote session; further remote calls fail.
    pub async fn finish(&self) {
        self.remote.disconnect().await;
    }

    async fn list_remote(&self) -> Result<Vec<TransferFile>, SyncError> {
        let mut attempt = 0;
        loop {
            match self.remote.list_all().await {
                Ok(files) => return Ok(files),
                Err(err) if err.is_retryable() => match self.retry.delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(attempt, error = %err, ?delay, "remote listing failed, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(self.listing_failed(err).await),
                },
                Err(err) => return Err(self.listing_failed(err).await),
            }
        }
    }

    async fn listing_failed(&self, err: RemoteFilesError) -> SyncError {
        tracing::error!(error = %err, "remote listing failed");
        self.remote.disconnect().await;
        SyncError::RemoteListing(err)
    }

    async fn last_sync_of(
        &self,
        file: &TransferFile,
        cache: &mut HashMap<String, Option<i64>>,
    ) -> Result<Option<i64>, SyncError> {
        let directory = file.sync_directory();
        if let Some(cached) = cache.get(directory) {
            return Ok(*cached);
        }
        let timestamp = self.timestamps.get_directory_timestamp(directory).await?;
        cache.insert(directory.to_string(), timestamp);
        Ok(timestamp)
    }
}

/// Staging files of interrupted downloads are dropped from both listings
/// alike, so they never pair one-sided.
fn without_partial_downloads(mut files: Vec<TransferFile>) -> Vec<TransferFile> {
    files.retain(|file| !is_partial_download(&file.path));
    files
}
