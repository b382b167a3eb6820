use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use super::operation::{Operation, infer_operation};
use super::transfer_file::{TransferFile, compare_paths, is_descendant};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("sync item needs at least one side")]
    NoSide,
    #[error("remote and local paths differ: {remote} vs {local}")]
    PathMismatch { remote: String, local: String },
    #[error("operation of {0} cannot be changed")]
    OperationLocked(String),
    #[error("no sync item for path: {0}")]
    UnknownPath(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Ok,
    Warning(String),
    Error(String),
}

impl ValidationResult {
    pub fn is_error(&self) -> bool {
        matches!(self, ValidationResult::Error(_))
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, ValidationResult::Warning(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ValidationResult::Ok => None,
            ValidationResult::Warning(msg) | ValidationResult::Error(msg) => Some(msg),
        }
    }
}

/// A remote/local pair for one relative path plus the operation to run on it.
#[derive(Debug, Clone)]
pub struct SyncItem {
    remote: Option<TransferFile>,
    local: Option<TransferFile>,
    last_sync: Option<i64>,
    default_operation: Operation,
    operation: Operation,
    staged_local: Option<PathBuf>,
}

impl SyncItem {
    pub fn new(
        remote: Option<TransferFile>,
        local: Option<TransferFile>,
        last_sync: Option<i64>,
    ) -> Result<Self, ItemError> {
        if let (Some(remote), Some(local)) = (&remote, &local)
            && remote.path != local.path
        {
            return Err(ItemError::PathMismatch {
                remote: remote.path.clone(),
                local: local.path.clone(),
            });
        }
        if remote.is_none() && local.is_none() {
            return Err(ItemError::NoSide);
        }
        let default_operation = infer_operation(remote.as_ref(), local.as_ref(), last_sync);
        Ok(Self {
            remote,
            local,
            last_sync,
            default_operation,
            operation: default_operation,
            staged_local: None,
        })
    }

    pub fn path(&self) -> &str {
        self.any_side().path.as_str()
    }

    pub fn remote(&self) -> Option<&TransferFile> {
        self.remote.as_ref()
    }

    pub fn local(&self) -> Option<&TransferFile> {
        self.local.as_ref()
    }

    pub fn last_sync(&self) -> Option<i64> {
        self.last_sync
    }

    pub fn has_last_sync(&self) -> bool {
        self.last_sync.is_some()
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn default_operation(&self) -> Operation {
        self.default_operation
    }

    pub fn is_directory(&self) -> bool {
        self.any_side().is_directory()
    }

    /// Directory whose sync timestamp is refreshed after this item is processed.
    pub fn sync_directory(&self) -> &str {
        self.any_side().sync_directory()
    }

    pub fn is_operation_change_possible(&self) -> bool {
        self.default_operation != Operation::Symlink
    }

    pub fn set_operation(&mut self, operation: Operation) -> Result<(), ItemError> {
        if !self.is_operation_change_possible() {
            return Err(ItemError::OperationLocked(self.path().to_string()));
        }
        self.operation = operation;
        Ok(())
    }

    pub fn reset_operation(&mut self) {
        self.operation = self.default_operation;
    }

    pub fn confirm_review(&mut self) {
        self.operation = self.operation.reviewed();
    }

    pub fn staged_local(&self) -> Option<&PathBuf> {
        self.staged_local.as_ref()
    }

    /// Attaches a temporary file whose content replaces the local file right
    /// before it is uploaded.
    pub fn set_staged_local(&mut self, staged: Option<PathBuf>) {
        self.staged_local = staged;
    }

    /// Structural checks that don't depend on other items.
    pub fn validate_self(&self) -> ValidationResult {
        match self.operation {
            Operation::Noop => ValidationResult::Ok,
            Operation::FileConflict => {
                ValidationResult::Error("file changed on both sides, merge it first".into())
            }
            Operation::FileDirCollision => {
                ValidationResult::Error("file on one side, directory on the other".into())
            }
            Operation::Symlink => {
                ValidationResult::Warning("symbolic links are never transferred".into())
            }
            Operation::Download | Operation::DownloadReview if self.remote.is_none() => {
                ValidationResult::Error("cannot download nonexistent file".into())
            }
            Operation::Upload | Operation::UploadReview if self.local.is_none() => {
                ValidationResult::Error("cannot upload nonexistent file".into())
            }
            Operation::DownloadReview | Operation::UploadReview => {
                ValidationResult::Warning("review this operation before the first transfer".into())
            }
            Operation::Download | Operation::Upload | Operation::Delete => ValidationResult::Ok,
        }
    }

    fn any_side(&self) -> &TransferFile {
        match (&self.remote, &self.local) {
            (Some(remote), _) => remote,
            (None, Some(local)) => local,
            (None, None) => unreachable!("sync item without sides"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub download: usize,
    pub upload: usize,
    pub delete: usize,
    pub noop: usize,
    pub errors: usize,
    pub warnings: usize,
    pub first_run: bool,
}

/// All sync items of one run, ordered by path.
#[derive(Debug, Clone, Default)]
pub struct SyncItems {
    items: Vec<SyncItem>,
}

impl SyncItems {
    pub fn new(mut items: Vec<SyncItem>) -> Self {
        items.sort_by(|a, b| compare_paths(a.path(), b.path()));
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncItem> {
        self.items.iter()
    }

    pub fn get(&self, path: &str) -> Option<&SyncItem> {
        self.position(path).map(|index| &self.items[index])
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut SyncItem> {
        self.position(path).map(|index| &mut self.items[index])
    }

    pub fn set_operation(&mut self, path: &str, operation: Operation) -> Result<(), ItemError> {
        self.get_mut(path)
            .ok_or_else(|| ItemError::UnknownPath(path.to_string()))?
            .set_operation(operation)
    }

    /// Items strictly below `path`.
    pub fn descendants<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a SyncItem> + 'a {
        self.items
            .iter()
            .filter(move |item| is_descendant(path, item.path()))
    }

    pub fn validate(&self, item: &SyncItem) -> ValidationResult {
        let result = item.validate_self();
        if result != ValidationResult::Ok
            || item.operation() != Operation::Delete
            || !item.is_directory()
        {
            return result;
        }

        let remote_side = item.remote().is_some();
        let local_side = item.local().is_some();
        let all_marked = self
            .descendants(item.path())
            .filter(|child| {
                (remote_side && child.remote().is_some()) || (local_side && child.local().is_some())
            })
            .all(|child| child.operation() == Operation::Delete);
        if all_marked {
            ValidationResult::Ok
        } else {
            ValidationResult::Error("children not marked for delete".into())
        }
    }

    /// Paths and messages of every item that must be resolved before a run.
    pub fn errors(&self) -> Vec<(String, String)> {
        self.items
            .iter()
            .filter_map(|item| match self.validate(item) {
                ValidationResult::Error(msg) => Some((item.path().to_string(), msg)),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> SyncSummary {
        let mut summary = SyncSummary::default();
        for item in &self.items {
            let validation = self.validate(item);
            if validation.is_error() {
                summary.errors += 1;
            } else if validation.is_warning() {
                summary.warnings += 1;
            }
            if !item.has_last_sync() {
                summary.first_run = true;
            }
            match item.operation() {
                Operation::Noop => summary.noop += 1,
                Operation::Download | Operation::DownloadReview => summary.download += 1,
                Operation::Upload | Operation::UploadReview => summary.upload += 1,
                Operation::Delete => summary.delete += 1,
                Operation::Symlink | Operation::FileConflict | Operation::FileDirCollision => {}
            }
        }
        summary
    }

    pub fn needs_review(&self) -> bool {
        self.items.iter().any(|item| item.operation().needs_review())
    }

    /// Rewrites every changeable item whose operation is in `from`.
    pub fn replace_operations(&mut self, from: &[Operation], to: Operation) -> usize {
        let mut changed = 0;
        for item in &mut self.items {
            if from.contains(&item.operation()) && item.set_operation(to).is_ok() {
                changed += 1;
            }
        }
        changed
    }

    pub fn confirm_all_reviews(&mut self) {
        for item in &mut self.items {
            item.confirm_review();
        }
    }

    pub fn reset_all(&mut self) {
        for item in &mut self.items {
            item.reset_operation();
        }
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.items
            .binary_search_by(|item| compare_paths(item.path(), path))
            .ok()
    }
}

#[cfg(test)]
#[path = "item_tests.rs"]
mod tests;
