use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;
use walkdir::WalkDir;

use super::paths::{PathError, local_path_for, relative_path_of};
use super::transfer_file::{FileKind, TransferFile};

#[derive(Debug, Error)]
pub enum LocalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalDelete {
    Deleted,
    Missing,
    NotEmpty,
}

/// The project's local directory tree.
#[derive(Debug, Clone)]
pub struct LocalTree {
    root: PathBuf,
}

impl LocalTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, relative: &str) -> Result<PathBuf, PathError> {
        local_path_for(&self.root, relative)
    }

    /// Lists every entry below the root, the root itself included. Symbolic
    /// links are followed.
    pub async fn list(&self) -> Result<Vec<TransferFile>, LocalError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || walk(&root)).await?
    }

    pub async fn create_dir(&self, relative: &str) -> Result<(), LocalError> {
        tokio::fs::create_dir_all(self.resolve(relative)?).await?;
        Ok(())
    }

    /// Replaces the local file with the staged copy at `staged`.
    pub async fn materialize_staged(&self, relative: &str, staged: &Path) -> Result<(), LocalError> {
        let target = self.resolve(relative)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(staged, &target).await?;
        Ok(())
    }

    pub async fn delete_file(&self, relative: &str) -> Result<LocalDelete, LocalError> {
        match tokio::fs::remove_file(self.resolve(relative)?).await {
            Ok(()) => Ok(LocalDelete::Deleted),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(LocalDelete::Missing),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes a directory only when it has no entries left.
    pub async fn delete_empty_dir(&self, relative: &str) -> Result<LocalDelete, LocalError> {
        let path = self.resolve(relative)?;
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(LocalDelete::Missing),
            Err(err) => return Err(err.into()),
        };
        if entries.next_entry().await?.is_some() {
            return Ok(LocalDelete::NotEmpty);
        }
        tokio::fs::remove_dir(&path).await?;
        Ok(LocalDelete::Deleted)
    }
}

fn walk(root: &Path) -> Result<Vec<TransferFile>, LocalError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        let metadata = entry.metadata()?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or_default();
        let relative = relative_path_of(root, entry.path())?;
        let file = if metadata.is_dir() {
            TransferFile::new(relative, FileKind::Directory, 0, modified)
        } else {
            TransferFile::new(relative, FileKind::File, metadata.len(), modified)
        };
        files.push(file);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_tree_with_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib/sub")).unwrap();
        std::fs::write(dir.path().join("index.php"), b"<?php").unwrap();
        std::fs::write(dir.path().join("lib/sub/a.php"), b"abc").unwrap();

        let tree = LocalTree::new(dir.path());
        let mut files = tree.list().await.unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["", "index.php", "lib", "lib/sub", "lib/sub/a.php"]);
        let index = files.iter().find(|f| f.path == "index.php").unwrap();
        assert_eq!(index.kind, FileKind::File);
        assert_eq!(index.size, 5);
        assert!(index.modified > 0);
        assert!(files.iter().find(|f| f.path == "lib").unwrap().is_directory());
    }

    #[tokio::test]
    async fn missing_root_lists_nothing() {
        let dir = tempdir().unwrap();
        let tree = LocalTree::new(dir.path().join("absent"));
        assert!(tree.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_empty_dir_keeps_non_empty_directories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("full")).unwrap();
        std::fs::write(dir.path().join("full/new.php"), b"x").unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();

        let tree = LocalTree::new(dir.path());
        assert_eq!(tree.delete_empty_dir("full").await.unwrap(), LocalDelete::NotEmpty);
        assert_eq!(tree.delete_empty_dir("empty").await.unwrap(), LocalDelete::Deleted);
        assert_eq!(tree.delete_empty_dir("empty").await.unwrap(), LocalDelete::Missing);
        assert!(dir.path().join("full/new.php").exists());
    }

    #[tokio::test]
    async fn delete_file_reports_missing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();

        let tree = LocalTree::new(dir.path());
        assert_eq!(tree.delete_file("a.txt").await.unwrap(), LocalDelete::Deleted);
        assert_eq!(tree.delete_file("a.txt").await.unwrap(), LocalDelete::Missing);
    }

    #[tokio::test]
    async fn materialize_staged_overwrites_local_file() {
        let dir = tempdir().unwrap();
        let staged = dir.path().join("staged.tmp");
        std::fs::write(&staged, b"merged").unwrap();
        std::fs::create_dir_all(dir.path().join("project")).unwrap();
        std::fs::write(dir.path().join("project/a.php"), b"old").unwrap();

        let tree = LocalTree::new(dir.path().join("project"));
        tree.materialize_staged("a.php", &staged).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("project/a.php")).unwrap(), b"merged");
    }

    #[test]
    fn resolve_rejects_escape() {
        let tree = LocalTree::new("/srv/project");
        assert!(tree.resolve("../x").is_err());
    }
}
