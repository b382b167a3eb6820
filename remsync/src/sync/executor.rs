use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;
use time::OffsetDateTime;

use super::item::SyncItem;
use super::local::{LocalDelete, LocalTree};
use super::operation::Operation;
use super::remote::RemoteFiles;
use super::timestamps::TimestampStore;
use super::transfer_file::TransferFile;
use super::transfer_info::TransferInfo;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub download: TransferInfo,
    pub upload: TransferInfo,
    pub delete: TransferInfo,
    pub cancelled: bool,
}

impl SyncResult {
    pub fn has_failures(&self) -> bool {
        self.download.has_anything_failed()
            || self.upload.has_anything_failed()
            || self.delete.has_anything_failed()
    }
}

/// Applies confirmed sync items one at a time.
///
/// Single-file failures are recorded and the batch goes on; the cancel flag
/// is checked before every item and before every deletion step.
pub struct SyncExecutor<'a, R> {
    remote: &'a R,
    local: &'a LocalTree,
    timestamps: &'a TimestampStore,
    cancel: Arc<AtomicBool>,
}

impl<'a, R: RemoteFiles> SyncExecutor<'a, R> {
    pub fn new(
        remote: &'a R,
        local: &'a LocalTree,
        timestamps: &'a TimestampStore,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            remote,
            local,
            timestamps,
            cancel,
        }
    }

    pub async fn run<'i, I>(&self, items: I) -> SyncResult
    where
        I: IntoIterator<Item = &'i SyncItem>,
    {
        let mut result = SyncResult::default();
        let mut deletions = Vec::new();

        for item in items {
            if self.is_cancelled() {
                tracing::info!(path = item.path(), "synchronization cancelled");
                result.cancelled = true;
                return result;
            }
            match item.operation() {
                Operation::Download | Operation::DownloadReview => {
                    let started = Instant::now();
                    self.download(item, &mut result.download).await;
                    result.download.runtime += started.elapsed();
                    self.stamp(item.sync_directory()).await;
                }
                Operation::Upload | Operation::UploadReview => {
                    let started = Instant::now();
                    self.upload(item, &mut result.upload).await;
                    result.upload.runtime += started.elapsed();
                    self.stamp(item.sync_directory()).await;
                }
                Operation::Delete => deletions.push(item),
                Operation::Noop
                | Operation::Symlink
                | Operation::FileConflict
                | Operation::FileDirCollision => {
                    tracing::trace!(path = item.path(), operation = %item.operation(), "skipped");
                }
            }
        }

        if !deletions.is_empty() {
            let started = Instant::now();
            let completed = self.delete(&deletions, &mut result.delete).await;
            result.delete.runtime += started.elapsed();
            for item in &deletions {
                self.stamp(item.sync_directory()).await;
            }
            if !completed {
                result.cancelled = true;
                return result;
            }
        }

        self.stamp("").await;
        result
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    async fn download(&self, item: &SyncItem, info: &mut TransferInfo) {
        let path = item.path();
        let Some(remote) = item.remote() else {
            info.add_failed(path, "cannot download nonexistent file");
            return;
        };
        let outcome = if remote.is_directory() {
            self.local.create_dir(path).await.map_err(|err| err.to_string())
        } else {
            match self.local.resolve(path) {
                Ok(target) => self
                    .remote
                    .download(remote, &target)
                    .await
                    .map_err(|err| err.to_string()),
                Err(err) => Err(err.to_string()),
            }
        };
        match outcome {
            Ok(()) => info.add_transferred(path),
            Err(reason) => {
                tracing::warn!(path, reason = %reason, "download failed");
                info.add_failed(path, reason);
            }
        }
    }

    async fn upload(&self, item: &SyncItem, info: &mut TransferInfo) {
        let path = item.path();
        let Some(local) = item.local() else {
            info.add_failed(path, "cannot upload nonexistent file");
            return;
        };
        let outcome = if local.is_directory() {
            self.remote.create_dir(path).await.map_err(|err| err.to_string())
        } else {
            self.upload_file(item, local).await
        };
        match outcome {
            Ok(()) => info.add_transferred(path),
            Err(reason) => {
                tracing::warn!(path, reason = %reason, "upload failed");
                info.add_failed(path, reason);
            }
        }
    }

    async fn upload_file(&self, item: &SyncItem, local: &TransferFile) -> Result<(), String> {
        if let Some(staged) = item.staged_local() {
            self.local
                .materialize_staged(&local.path, staged)
                .await
                .map_err(|err| format!("cannot apply staged copy: {err}"))?;
        }
        let source = self.local.resolve(&local.path).map_err(|err| err.to_string())?;
        self.remote
            .upload(local, &source)
            .await
            .map_err(|err| err.to_string())
    }

    /// Returns `false` when cancelled before all deletions were attempted.
    async fn delete(&self, items: &[&SyncItem], info: &mut TransferInfo) -> bool {
        let remote: Vec<TransferFile> = deletion_order(items.iter().filter_map(|item| item.remote()));
        let local: Vec<TransferFile> = deletion_order(items.iter().filter_map(|item| item.local()));

        if !remote.is_empty() {
            if self.is_cancelled() {
                return false;
            }
            match self.remote.delete(&remote).await {
                Ok(report) => info.merge(report),
                Err(err) => {
                    tracing::warn!(error = %err, files = remote.len(), "remote delete failed");
                    for file in &remote {
                        info.add_failed(file.path.clone(), err.to_string());
                    }
                }
            }
        }

        let mut local_info = TransferInfo::new();
        let completed = self.delete_local(&local, &mut local_info).await;
        info.merge(local_info);
        completed
    }

    async fn delete_local(&self, files: &[TransferFile], info: &mut TransferInfo) -> bool {
        for file in files {
            if self.is_cancelled() {
                return false;
            }
            let outcome = if file.is_directory() {
                self.local.delete_empty_dir(&file.path).await
            } else {
                self.local.delete_file(&file.path).await
            };
            match outcome {
                Ok(LocalDelete::Deleted) => info.add_transferred(file.path.clone()),
                Ok(LocalDelete::NotEmpty) => {
                    info.add_ignored(file.path.clone(), "directory not empty")
                }
                Ok(LocalDelete::Missing) => {
                    info.add_ignored(file.path.clone(), "already deleted")
                }
                Err(err) => {
                    tracing::warn!(path = %file.path, error = %err, "local delete failed");
                    info.add_failed(file.path.clone(), err.to_string());
                }
            }
        }
        true
    }

    async fn stamp(&self, directory: &str) {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if let Err(err) = self.timestamps.set_directory_timestamp(directory, now).await {
            tracing::warn!(directory, error = %err, "failed to record sync timestamp");
        }
    }
}

/// Files first, then directories deepest-first so parents are emptied before
/// they are removed.
fn deletion_order<'f>(files: impl Iterator<Item = &'f TransferFile>) -> Vec<TransferFile> {
    let (mut dirs, mut plain): (Vec<TransferFile>, Vec<TransferFile>) =
        files.cloned().partition(TransferFile::is_directory);
    plain.sort_by(|a, b| a.path.cmp(&b.path));
    dirs.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.path.cmp(&b.path)));
    plain.extend(dirs);
    plain
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
