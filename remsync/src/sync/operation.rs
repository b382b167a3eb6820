use std::fmt;

use super::transfer_file::TransferFile;

/// Slack applied whenever a remote timestamp is compared, in seconds.
pub const REMOTE_TIME_TOLERANCE: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Noop,
    Download,
    DownloadReview,
    Upload,
    UploadReview,
    Delete,
    Symlink,
    FileDirCollision,
    FileConflict,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Noop => "noop",
            Operation::Download => "download",
            Operation::DownloadReview => "download-review",
            Operation::Upload => "upload",
            Operation::UploadReview => "upload-review",
            Operation::Delete => "delete",
            Operation::Symlink => "symlink",
            Operation::FileDirCollision => "file-dir-collision",
            Operation::FileConflict => "file-conflict",
        }
    }

    pub fn is_download(&self) -> bool {
        matches!(self, Operation::Download | Operation::DownloadReview)
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, Operation::Upload | Operation::UploadReview)
    }

    pub fn needs_review(&self) -> bool {
        matches!(self, Operation::DownloadReview | Operation::UploadReview)
    }

    /// Review variants collapse to the transfer they stand for.
    pub fn reviewed(self) -> Self {
        match self {
            Operation::DownloadReview => Operation::Download,
            Operation::UploadReview => Operation::Upload,
            other => other,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote modification time; remote clocks and listings are imprecise so
/// every comparison goes through the tolerance window, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteTimestamp(pub i64);

impl RemoteTimestamp {
    pub fn equals_to(self, reference: i64) -> bool {
        (self.0 - reference).abs() <= REMOTE_TIME_TOLERANCE
    }

    pub fn newer_than(self, reference: i64) -> bool {
        self.0 - reference > REMOTE_TIME_TOLERANCE
    }

    pub fn older_than(self, reference: i64) -> bool {
        reference - self.0 > REMOTE_TIME_TOLERANCE
    }

    pub fn equals_or_older_than(self, reference: i64) -> bool {
        !self.newer_than(reference)
    }
}

/// Default operation for a remote/local pair given the last-sync timestamp of
/// its directory (`None` on the first synchronization).
pub fn infer_operation(
    remote: Option<&TransferFile>,
    local: Option<&TransferFile>,
    last_sync: Option<i64>,
) -> Operation {
    if remote.is_some_and(TransferFile::is_symlink) {
        return Operation::Symlink;
    }

    match (remote, local) {
        (None, None) => Operation::Noop,
        (Some(remote), None) => match last_sync {
            None => Operation::Download,
            Some(last) if RemoteTimestamp(remote.modified).newer_than(last) => Operation::Download,
            Some(_) => Operation::Delete,
        },
        (None, Some(local)) => match last_sync {
            None => Operation::Upload,
            Some(last) if local.modified > last => Operation::Upload,
            Some(_) => Operation::Delete,
        },
        (Some(remote), Some(local)) => {
            if remote.is_directory() != local.is_directory() {
                return Operation::FileDirCollision;
            }
            if remote.is_directory() {
                return Operation::Noop;
            }
            infer_file_pair(remote, local, last_sync)
        }
    }
}

fn infer_file_pair(remote: &TransferFile, local: &TransferFile, last_sync: Option<i64>) -> Operation {
    let remote_time = RemoteTimestamp(remote.modified);
    let same_size = remote.size == local.size;

    if remote_time.equals_to(local.modified) && same_size {
        return Operation::Noop;
    }

    let Some(last) = last_sync else {
        return if remote_time.newer_than(local.modified) {
            Operation::DownloadReview
        } else {
            Operation::UploadReview
        };
    };

    if local.modified > last && remote_time.newer_than(last) {
        return Operation::FileConflict;
    }
    if local.modified <= last && remote_time.equals_or_older_than(last) && same_size {
        return Operation::Noop;
    }
    if remote_time.newer_than(local.modified) {
        Operation::Download
    } else {
        Operation::Upload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, modified: i64, size: u64) -> TransferFile {
        TransferFile::file(path, size, modified)
    }

    #[test]
    fn tolerance_window_is_inclusive() {
        assert!(RemoteTimestamp(130).equals_to(100));
        assert!(RemoteTimestamp(70).equals_to(100));
        assert!(!RemoteTimestamp(131).equals_to(100));
        assert!(!RemoteTimestamp(130).newer_than(100));
        assert!(RemoteTimestamp(131).newer_than(100));
        assert!(!RemoteTimestamp(70).older_than(100));
        assert!(RemoteTimestamp(69).older_than(100));
        assert!(RemoteTimestamp(130).equals_or_older_than(100));
    }

    #[test]
    fn remote_symlink_wins() {
        let remote = TransferFile::symlink("a", 10);
        let local = file("a", 10, 1);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), Some(5)),
            Operation::Symlink
        );
        assert_eq!(infer_operation(Some(&remote), None, None), Operation::Symlink);
    }

    #[test]
    fn file_and_directory_collide() {
        let remote = TransferFile::directory("a", 10);
        let local = file("a", 10, 1);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), None),
            Operation::FileDirCollision
        );
    }

    #[test]
    fn two_directories_are_noop() {
        let remote = TransferFile::directory("a", 10);
        let local = TransferFile::directory("a", 9000);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), None),
            Operation::Noop
        );
    }

    #[test]
    fn first_run_transfers_missing_side() {
        let remote = file("r.txt", 100, 1);
        let local = file("l.txt", 100, 1);
        assert_eq!(infer_operation(Some(&remote), None, None), Operation::Download);
        assert_eq!(infer_operation(None, Some(&local), None), Operation::Upload);
    }

    #[test]
    fn single_local_side_uploads_or_deletes() {
        let local = file("c.txt", 300, 1);
        assert_eq!(infer_operation(None, Some(&local), Some(100)), Operation::Upload);
        assert_eq!(infer_operation(None, Some(&local), Some(400)), Operation::Delete);
        assert_eq!(infer_operation(None, Some(&local), Some(300)), Operation::Delete);
    }

    #[test]
    fn single_remote_side_uses_tolerance() {
        let remote = file("r.txt", 130, 1);
        assert_eq!(infer_operation(Some(&remote), None, Some(100)), Operation::Delete);
        let remote = file("r.txt", 131, 1);
        assert_eq!(infer_operation(Some(&remote), None, Some(100)), Operation::Download);
    }

    #[test]
    fn equal_files_are_noop_regardless_of_last_sync() {
        let remote = file("a.txt", 1000, 10);
        let local = file("a.txt", 1000, 10);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), Some(500)),
            Operation::Noop
        );
        let remote = file("a.txt", 1029, 10);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), None),
            Operation::Noop
        );
    }

    #[test]
    fn first_run_with_both_sides_needs_review() {
        let remote = file("a.txt", 2000, 10);
        let local = file("a.txt", 1000, 10);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), None),
            Operation::DownloadReview
        );
        let remote = file("a.txt", 1000, 10);
        let local = file("a.txt", 2000, 10);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), None),
            Operation::UploadReview
        );
        let local = file("a.txt", 1000, 11);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), None),
            Operation::UploadReview
        );
    }

    #[test]
    fn both_changed_since_last_sync_is_conflict() {
        let remote = file("b.txt", 2000, 10);
        let local = file("b.txt", 100, 10);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), Some(50)),
            Operation::FileConflict
        );
    }

    #[test]
    fn unchanged_since_last_sync_is_noop() {
        let remote = file("a.txt", 520, 10);
        let local = file("a.txt", 400, 10);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), Some(500)),
            Operation::Noop
        );
    }

    #[test]
    fn newer_side_wins_after_last_sync() {
        let remote = file("a.txt", 900, 10);
        let local = file("a.txt", 100, 10);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), Some(500)),
            Operation::Download
        );
        let remote = file("a.txt", 100, 10);
        let local = file("a.txt", 900, 10);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), Some(500)),
            Operation::Upload
        );
    }

    #[test]
    fn size_change_without_time_change_uploads() {
        let remote = file("a.txt", 100, 10);
        let local = file("a.txt", 200, 12);
        assert_eq!(
            infer_operation(Some(&remote), Some(&local), Some(500)),
            Operation::Upload
        );
    }

    #[test]
    fn review_variants_collapse() {
        assert_eq!(Operation::DownloadReview.reviewed(), Operation::Download);
        assert_eq!(Operation::UploadReview.reviewed(), Operation::Upload);
        assert_eq!(Operation::Delete.reviewed(), Operation::Delete);
        assert!(Operation::UploadReview.needs_review());
    }
}
