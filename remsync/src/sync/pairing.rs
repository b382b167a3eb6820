use std::cmp::Ordering;

use super::transfer_file::{TransferFile, compare_paths};

/// One relative path with whatever each side has for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePair {
    pub remote: Option<TransferFile>,
    pub local: Option<TransferFile>,
}

impl FilePair {
    pub fn path(&self) -> &str {
        self.remote
            .as_ref()
            .or(self.local.as_ref())
            .map(|file| file.path.as_str())
            .unwrap_or_default()
    }
}

/// Merge-joins the remote and local listings by path.
///
/// Both inputs must already be free of duplicate paths. The project root is
/// synchronized on its own and never appears in the output.
pub fn pair_files(remote: Vec<TransferFile>, local: Vec<TransferFile>) -> Vec<FilePair> {
    let remote = sorted_without_root(remote);
    let local = sorted_without_root(local);

    let mut pairs = Vec::with_capacity(remote.len().max(local.len()));
    let mut remote = remote.into_iter().peekable();
    let mut local = local.into_iter().peekable();

    loop {
        let order = match (remote.peek(), local.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(r), Some(l)) => compare_paths(&r.path, &l.path),
        };
        let pair = match order {
            Ordering::Less => FilePair {
                remote: remote.next(),
                local: None,
            },
            Ordering::Greater => FilePair {
                remote: None,
                local: local.next(),
            },
            Ordering::Equal => FilePair {
                remote: remote.next(),
                local: local.next(),
            },
        };
        pairs.push(pair);
    }

    pairs
}

fn sorted_without_root(mut files: Vec<TransferFile>) -> Vec<TransferFile> {
    files.retain(|file| !file.is_root());
    files.sort_by(|a, b| compare_paths(&a.path, &b.path));
    files
}
