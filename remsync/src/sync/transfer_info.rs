use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;

/// Outcome of one operation category (download, upload or delete).
///
/// A path lands in at most one bucket of each kind; the first recorded
/// reason wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferInfo {
    pub transferred: BTreeSet<String>,
    pub ignored: BTreeMap<String, String>,
    pub partially_failed: BTreeMap<String, String>,
    pub failed: BTreeMap<String, String>,
    #[serde(with = "duration_millis")]
    pub runtime: Duration,
}

impl TransferInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transferred(&mut self, path: impl Into<String>) {
        let path = path.into();
        tracing::debug!(path = %path, "transferred");
        self.transferred.insert(path);
    }

    pub fn add_failed(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        record_once(&mut self.failed, "failed", path.into(), reason.into());
    }

    pub fn add_partially_failed(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        record_once(
            &mut self.partially_failed,
            "partially failed",
            path.into(),
            reason.into(),
        );
    }

    pub fn add_ignored(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        record_once(&mut self.ignored, "ignored", path.into(), reason.into());
    }

    pub fn is_failed(&self, path: &str) -> bool {
        self.failed.contains_key(path)
    }

    pub fn has_anything_failed(&self) -> bool {
        !self.failed.is_empty() || !self.partially_failed.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.transferred.is_empty()
            && self.ignored.is_empty()
            && self.partially_failed.is_empty()
            && self.failed.is_empty()
    }

    /// Folds another result into this one. A path reported by both keeps
    /// only its worse outcome (failed, then partially failed, then ignored,
    /// then transferred); on a tie the reason already recorded wins.
    pub fn merge(&mut self, other: TransferInfo) {
        for path in other.transferred {
            if self.outcome_of(&path).is_none() {
                self.transferred.insert(path);
            }
        }
        for (path, reason) in other.ignored {
            self.merge_outcome(path, reason, Outcome::Ignored);
        }
        for (path, reason) in other.partially_failed {
            self.merge_outcome(path, reason, Outcome::PartiallyFailed);
        }
        for (path, reason) in other.failed {
            self.merge_outcome(path, reason, Outcome::Failed);
        }
        self.runtime += other.runtime;
    }

    fn outcome_of(&self, path: &str) -> Option<Outcome> {
        if self.failed.contains_key(path) {
            Some(Outcome::Failed)
        } else if self.partially_failed.contains_key(path) {
            Some(Outcome::PartiallyFailed)
        } else if self.ignored.contains_key(path) {
            Some(Outcome::Ignored)
        } else if self.transferred.contains(path) {
            Some(Outcome::Transferred)
        } else {
            None
        }
    }

    fn merge_outcome(&mut self, path: String, reason: String, outcome: Outcome) {
        if self.outcome_of(&path).is_some_and(|existing| existing >= outcome) {
            return;
        }
        self.transferred.remove(&path);
        self.ignored.remove(&path);
        self.partially_failed.remove(&path);
        let bucket = match outcome {
            Outcome::Transferred | Outcome::Ignored => &mut self.ignored,
            Outcome::PartiallyFailed => &mut self.partially_failed,
            Outcome::Failed => &mut self.failed,
        };
        bucket.insert(path, reason);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Outcome {
    Transferred,
    Ignored,
    PartiallyFailed,
    Failed,
}

fn record_once(bucket: &mut BTreeMap<String, String>, kind: &str, path: String, reason: String) {
    if bucket.contains_key(&path) {
        tracing::debug!(path = %path, reason = %reason, "{kind} already recorded, keeping first reason");
        return;
    }
    tracing::debug!(path = %path, reason = %reason, "{kind}");
    bucket.insert(path, reason);
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_reason_is_kept() {
        let mut info = TransferInfo::new();
        info.add_failed("a.txt", "timeout");
        info.add_failed("a.txt", "again");
        assert_eq!(info.failed.get("a.txt").map(String::as_str), Some("timeout"));
        assert!(info.is_failed("a.txt"));
        assert!(info.has_anything_failed());
    }

    #[test]
    fn merge_combines_buckets_and_runtime() {
        let mut left = TransferInfo::new();
        left.add_transferred("a");
        left.runtime = Duration::from_millis(5);
        let mut right = TransferInfo::new();
        right.add_ignored("dir", "not empty");
        right.add_partially_failed("lib", "1 child kept");
        right.runtime = Duration::from_millis(7);

        left.merge(right);

        assert!(left.transferred.contains("a"));
        assert_eq!(left.ignored.len(), 1);
        assert_eq!(left.partially_failed.len(), 1);
        assert_eq!(left.runtime, Duration::from_millis(12));
        assert!(!left.is_empty());
    }

    #[test]
    fn merge_keeps_only_the_worse_outcome_per_path() {
        let mut remote = TransferInfo::new();
        remote.add_failed("a.php", "permission denied");
        remote.add_transferred("b.php");
        let mut local = TransferInfo::new();
        local.add_transferred("a.php");
        local.add_ignored("b.php", "already deleted");

        remote.merge(local);

        assert!(!remote.transferred.contains("a.php"));
        assert_eq!(remote.failed.get("a.php").map(String::as_str), Some("permission denied"));
        assert!(!remote.transferred.contains("b.php"));
        assert_eq!(remote.ignored.get("b.php").map(String::as_str), Some("already deleted"));
    }

    #[test]
    fn serializes_runtime_as_millis() {
        let mut info = TransferInfo::new();
        info.runtime = Duration::from_millis(1500);
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["runtime"], 1500);
    }
}
