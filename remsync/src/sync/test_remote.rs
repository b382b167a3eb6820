//! Scripted in-memory remote used by the executor and controller tests.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use remsync_core::RemoteError;
use reqwest::StatusCode;

use super::remote::{RemoteFiles, RemoteFilesError};
use super::transfer_file::TransferFile;
use super::transfer_info::TransferInfo;

#[derive(Default)]
pub struct FakeRemote {
    pub listing: Vec<TransferFile>,
    pub contents: BTreeMap<String, Vec<u8>>,
    pub failing: HashSet<String>,
    pub listing_failures: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
    pub uploaded: Mutex<BTreeMap<String, Vec<u8>>>,
    pub delete_batches: Mutex<Vec<Vec<String>>>,
    pub disconnected: AtomicBool,
    /// Raised after the given number of transfer calls.
    pub cancel_after: Option<(usize, Arc<AtomicBool>)>,
}

impl FakeRemote {
    pub fn with_listing(listing: Vec<TransferFile>) -> Self {
        Self {
            listing,
            ..Self::default()
        }
    }

    pub fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), RemoteFilesError> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call.clone());
            calls.len()
        };
        if let Some((limit, flag)) = &self.cancel_after
            && count >= *limit
        {
            flag.store(true, Ordering::SeqCst);
        }
        let path = call.split_once(' ').map(|(_, path)| path).unwrap_or_default();
        if self.failing.contains(path) {
            return Err(network_error());
        }
        Ok(())
    }
}

pub fn network_error() -> RemoteFilesError {
    RemoteFilesError::Api(RemoteError::Api {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "network unreachable".to_string(),
    })
}

impl RemoteFiles for FakeRemote {
    async fn list_all(&self) -> Result<Vec<TransferFile>, RemoteFilesError> {
        let remaining = self.listing_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.listing_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(network_error());
        }
        Ok(self.listing.clone())
    }

    async fn download(&self, file: &TransferFile, target: &Path) -> Result<(), RemoteFilesError> {
        self.record(format!("download {}", file.path))?;
        let body = self.contents.get(&file.path).cloned().unwrap_or_default();
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|_| network_error())?;
        }
        std::fs::write(target, body).map_err(|_| network_error())?;
        Ok(())
    }

    async fn upload(&self, file: &TransferFile, source: &Path) -> Result<(), RemoteFilesError> {
        self.record(format!("upload {}", file.path))?;
        let body = std::fs::read(source).map_err(|_| network_error())?;
        self.uploaded.lock().unwrap().insert(file.path.clone(), body);
        Ok(())
    }

    async fn create_dir(&self, relative: &str) -> Result<(), RemoteFilesError> {
        self.record(format!("mkdir {relative}"))
    }

    async fn delete(&self, files: &[TransferFile]) -> Result<TransferInfo, RemoteFilesError> {
        let paths: Vec<String> = files.iter().map(|file| file.path.clone()).collect();
        self.delete_batches.lock().unwrap().push(paths.clone());
        let mut info = TransferInfo::new();
        for path in paths {
            if self.failing.contains(&path) {
                info.add_failed(path, "permission denied");
            } else {
                info.add_transferred(path);
            }
        }
        Ok(info)
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}
