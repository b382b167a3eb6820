use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
}

/// One entry of a remote or local listing.
///
/// `path` is relative to the project root, slash separated, without leading
/// or trailing slashes. The project root itself has the empty path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFile {
    pub path: String,
    pub kind: FileKind,
    pub size: u64,
    pub modified: i64,
    pub md5: Option<String>,
}

impl TransferFile {
    pub fn new(path: impl Into<String>, kind: FileKind, size: u64, modified: i64) -> Self {
        Self {
            path: normalize_relative(&path.into()),
            kind,
            size,
            modified,
            md5: None,
        }
    }

    pub fn file(path: impl Into<String>, size: u64, modified: i64) -> Self {
        Self::new(path, FileKind::File, size, modified)
    }

    pub fn directory(path: impl Into<String>, modified: i64) -> Self {
        Self::new(path, FileKind::Directory, 0, modified)
    }

    pub fn symlink(path: impl Into<String>, modified: i64) -> Self {
        Self::new(path, FileKind::Symlink, 0, modified)
    }

    pub fn with_md5(mut self, md5: Option<String>) -> Self {
        self.md5 = md5;
        self
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Parent directory path; `None` for the root.
    pub fn parent_path(&self) -> Option<&str> {
        parent_of(&self.path)
    }

    /// Path of the directory whose sync timestamp governs this entry.
    pub fn sync_directory(&self) -> &str {
        if self.is_file() {
            self.parent_path().unwrap_or_default()
        } else {
            &self.path
        }
    }

    pub fn depth(&self) -> usize {
        depth_of(&self.path)
    }
}

pub fn normalize_relative(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

pub fn parent_of(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or("", |(parent, _)| parent))
}

pub fn depth_of(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.split('/').count()
    }
}

/// `true` when `descendant` lies strictly below `ancestor`.
pub fn is_descendant(ancestor: &str, descendant: &str) -> bool {
    if ancestor.is_empty() {
        return !descendant.is_empty();
    }
    descendant
        .strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Segment-wise byte-lexicographic ordering, so `a/b` sorts before `a.b`.
pub fn compare_paths(left: &str, right: &str) -> Ordering {
    let left = left.split('/').filter(|s| !s.is_empty());
    let right = right.split('/').filter(|s| !s.is_empty());
    left.map(str::as_bytes).cmp(right.map(str::as_bytes))
}
