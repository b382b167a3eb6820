use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use remsync_core::{DeleteStatus, EntryType, RemoteClient, RemoteEntry, RemoteError};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::paths::{relative_remote_path, remote_path_for};
use super::transfer::{TransferClient, TransferError};
use super::transfer_file::{FileKind, TransferFile};
use super::transfer_info::TransferInfo;

#[derive(Debug, Error)]
pub enum RemoteFilesError {
    #[error("api error: {0}")]
    Api(#[from] RemoteError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("time parse error: {0}")]
    Time(#[from] time::error::Parse),
    #[error("remote entry outside of the remote root: {0}")]
    OutsideRoot(String),
    #[error("remote entry without modification time: {0}")]
    MissingModified(String),
}

impl RemoteFilesError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteFilesError::Api(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Remote side of a synchronization run, addressed by project-relative paths.
pub trait RemoteFiles {
    /// Every entry below the remote root, the root itself included.
    fn list_all(&self) -> impl Future<Output = Result<Vec<TransferFile>, RemoteFilesError>> + Send;

    fn download(
        &self,
        file: &TransferFile,
        target: &Path,
    ) -> impl Future<Output = Result<(), RemoteFilesError>> + Send;

    fn upload(
        &self,
        file: &TransferFile,
        source: &Path,
    ) -> impl Future<Output = Result<(), RemoteFilesError>> + Send;

    fn create_dir(&self, relative: &str) -> impl Future<Output = Result<(), RemoteFilesError>> + Send;

    /// Deletes all `files` in one call; per-file outcomes land in the result.
    fn delete(
        &self,
        files: &[TransferFile],
    ) -> impl Future<Output = Result<TransferInfo, RemoteFilesError>> + Send;

    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}

/// [`RemoteFiles`] over the remote file service REST API.
pub struct HttpRemote {
    client: RemoteClient,
    transfer: TransferClient,
    remote_root: String,
    page_size: u32,
    disconnected: AtomicBool,
}

impl HttpRemote {
    pub fn new(client: RemoteClient, remote_root: impl Into<String>) -> Self {
        Self {
            client,
            transfer: TransferClient::new(),
            remote_root: remote_root.into(),
            page_size: 200,
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn with_transfer(mut self, transfer: TransferClient) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn ensure_connected(&self) -> Result<(), RemoteFilesError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(RemoteError::Disconnected.into());
        }
        Ok(())
    }

    fn to_transfer_file(&self, entry: &RemoteEntry) -> Result<TransferFile, RemoteFilesError> {
        let relative = relative_remote_path(&self.remote_root, &entry.path)
            .ok_or_else(|| RemoteFilesError::OutsideRoot(entry.path.clone()))?;
        let kind = match entry.entry_type {
            EntryType::File => FileKind::File,
            EntryType::Dir => FileKind::Directory,
            EntryType::Symlink => FileKind::Symlink,
        };
        let modified = entry
            .modified
            .as_deref()
            .ok_or_else(|| RemoteFilesError::MissingModified(entry.path.clone()))?;
        let modified = OffsetDateTime::parse(modified, &Rfc3339)?.unix_timestamp();
        Ok(TransferFile::new(relative, kind, entry.size.unwrap_or(0), modified)
            .with_md5(entry.md5.clone()))
    }
}

impl RemoteFiles for HttpRemote {
    async fn list_all(&self) -> Result<Vec<TransferFile>, RemoteFilesError> {
        self.ensure_connected()?;
        let mut files = vec![TransferFile::directory("", 0)];
        let mut pending = VecDeque::from([String::new()]);
        while let Some(dir) = pending.pop_front() {
            let remote_dir = remote_path_for(&self.remote_root, &dir);
            let entries = self
                .client
                .list_directory_all(&remote_dir, self.page_size)
                .await?;
            tracing::debug!(dir = %remote_dir, entries = entries.len(), "listed remote directory");
            for entry in &entries {
                let file = self.to_transfer_file(entry)?;
                if file.is_root() || file.path == dir {
                    continue;
                }
                if file.is_directory() {
                    pending.push_back(file.path.clone());
                }
                files.push(file);
            }
        }
        Ok(files)
    }

    async fn download(&self, file: &TransferFile, target: &Path) -> Result<(), RemoteFilesError> {
        self.ensure_connected()?;
        let remote_path = remote_path_for(&self.remote_root, &file.path);
        let link = self.client.get_download_link(&remote_path).await?;
        self.transfer
            .download(&link, target, file.md5.as_deref())
            .await?;
        Ok(())
    }

    async fn upload(&self, file: &TransferFile, source: &Path) -> Result<(), RemoteFilesError> {
        self.ensure_connected()?;
        let remote_path = remote_path_for(&self.remote_root, &file.path);
        let link = self.client.get_upload_link(&remote_path, true).await?;
        self.transfer.upload(&link, source).await?;
        Ok(())
    }

    async fn create_dir(&self, relative: &str) -> Result<(), RemoteFilesError> {
        self.ensure_connected()?;
        let remote_path = remote_path_for(&self.remote_root, relative);
        self.client.create_directory(&remote_path).await?;
        Ok(())
    }

    async fn delete(&self, files: &[TransferFile]) -> Result<TransferInfo, RemoteFilesError> {
        self.ensure_connected()?;
        let mut info = TransferInfo::new();
        if files.is_empty() {
            return Ok(info);
        }
        let paths: Vec<String> = files
            .iter()
            .map(|file| remote_path_for(&self.remote_root, &file.path))
            .collect();
        let report = self.client.delete_batch(&paths).await?;
        for result in report.results {
            let relative = relative_remote_path(&self.remote_root, &result.path)
                .unwrap_or_else(|| result.path.clone());
            let reason = result.reason.unwrap_or_else(|| "unknown reason".to_string());
            match result.status {
                DeleteStatus::Deleted => info.add_transferred(relative),
                DeleteStatus::Partial => info.add_partially_failed(relative, reason),
                DeleteStatus::Failed => info.add_failed(relative, reason),
            }
        }
        for file in files {
            let reported = info.transferred.contains(&file.path)
                || info.partially_failed.contains_key(&file.path)
                || info.failed.contains_key(&file.path);
            if !reported {
                info.add_failed(file.path.clone(), "not reported by the remote");
            }
        }
        Ok(info)
    }

    async fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.client.close_session().await {
            tracing::warn!(error = %err, "failed to close remote session");
        }
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
