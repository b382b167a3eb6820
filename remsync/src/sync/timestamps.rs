use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool, migrate::Migrator};
use thiserror::Error;

use super::transfer_file::{TransferFile, parent_of};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
}

/// Last-synchronized timestamps of the project's directories.
///
/// Rows are keyed by the sha256 of the directory's absolute local path and
/// scoped by project, so one database serves any number of projects.
pub struct TimestampStore {
    pool: SqlitePool,
    project: String,
    local_root: PathBuf,
}

impl TimestampStore {
    pub fn from_pool(pool: SqlitePool, project: impl Into<String>, local_root: PathBuf) -> Self {
        Self {
            pool,
            project: project.into(),
            local_root,
        }
    }

    pub async fn open(
        db_path: &Path,
        project: impl Into<String>,
        local_root: PathBuf,
    ) -> Result<Self, TimestampError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self::from_pool(pool, project, local_root);
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), TimestampError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Timestamp of the nearest recorded directory at or above `file`'s
    /// directory, `None` when nothing up to the project root was recorded.
    pub async fn get_sync_timestamp(&self, file: &TransferFile) -> Result<Option<i64>, TimestampError> {
        self.get_directory_timestamp(file.sync_directory()).await
    }

    pub async fn get_directory_timestamp(&self, directory: &str) -> Result<Option<i64>, TimestampError> {
        let mut current = Some(directory);
        while let Some(dir) = current {
            if let Some(timestamp) = self.lookup(dir).await? {
                return Ok(Some(timestamp));
            }
            current = parent_of(dir);
        }
        Ok(None)
    }

    /// Records `timestamp` for a directory. Returns `false` and stores nothing
    /// for any other kind of entry.
    pub async fn set_sync_timestamp(
        &self,
        file: &TransferFile,
        timestamp: i64,
    ) -> Result<bool, TimestampError> {
        if !file.is_directory() {
            return Ok(false);
        }
        self.set_directory_timestamp(&file.path, timestamp).await?;
        Ok(true)
    }

    pub async fn set_directory_timestamp(
        &self,
        directory: &str,
        timestamp: i64,
    ) -> Result<(), TimestampError> {
        sqlx::query(
            "INSERT INTO sync_timestamps (project, path_hash, directory, timestamp)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project, path_hash) DO UPDATE SET
                 directory = excluded.directory,
                 timestamp = excluded.timestamp",
        )
        .bind(&self.project)
        .bind(self.key_for(directory))
        .bind(directory)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Forgets every timestamp of the project; the next run is a first run.
    pub async fn clear_project(&self) -> Result<u64, TimestampError> {
        let result = sqlx::query("DELETE FROM sync_timestamps WHERE project = ?1")
            .bind(&self.project)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn lookup(&self, directory: &str) -> Result<Option<i64>, TimestampError> {
        let row = sqlx::query(
            "SELECT timestamp FROM sync_timestamps WHERE project = ?1 AND path_hash = ?2",
        )
        .bind(&self.project)
        .bind(self.key_for(directory))
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("timestamp")?)),
            None => Ok(None),
        }
    }

    fn key_for(&self, directory: &str) -> String {
        let absolute = if directory.is_empty() {
            self.local_root.clone()
        } else {
            self.local_root.join(directory)
        };
        let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
        digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

pub fn default_db_path() -> Result<PathBuf, TimestampError> {
    let mut path = dirs::data_dir().ok_or(TimestampError::MissingDataDir)?;
    path.push("remsync");
    path.push("timestamps.db");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_store(project: &str) -> TimestampStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = TimestampStore::from_pool(pool, project, PathBuf::from("/srv/project"));
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn unknown_without_any_record() {
        let store = make_store("p").await;
        let file = TransferFile::file("a/b/c.php", 1, 1);
        assert_eq!(store.get_sync_timestamp(&file).await.unwrap(), None);
    }

    #[tokio::test]
    async fn falls_back_to_nearest_ancestor() {
        let store = make_store("p").await;
        store.set_directory_timestamp("", 100).await.unwrap();
        store.set_directory_timestamp("a", 200).await.unwrap();

        let deep = TransferFile::file("a/b/c.php", 1, 1);
        assert_eq!(store.get_sync_timestamp(&deep).await.unwrap(), Some(200));

        let other = TransferFile::directory("z/y", 1);
        assert_eq!(store.get_sync_timestamp(&other).await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn file_lookup_starts_at_parent_directory() {
        let store = make_store("p").await;
        store.set_directory_timestamp("a/b", 300).await.unwrap();

        let file_named_like_dir = TransferFile::file("a/b", 1, 1);
        assert_eq!(store.get_sync_timestamp(&file_named_like_dir).await.unwrap(), None);

        let dir = TransferFile::directory("a/b", 1);
        assert_eq!(store.get_sync_timestamp(&dir).await.unwrap(), Some(300));
    }

    #[tokio::test]
    async fn only_directories_are_recorded() {
        let store = make_store("p").await;
        let file = TransferFile::file("a/c.php", 1, 1);
        assert!(!store.set_sync_timestamp(&file, 10).await.unwrap());
        assert_eq!(store.get_directory_timestamp("a").await.unwrap(), None);

        let dir = TransferFile::directory("a", 1);
        assert!(store.set_sync_timestamp(&dir, 10).await.unwrap());
        store.set_sync_timestamp(&dir, 20).await.unwrap();
        assert_eq!(store.get_directory_timestamp("a").await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn projects_are_isolated_and_clearable() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let first = TimestampStore::from_pool(pool.clone(), "first", PathBuf::from("/srv/p"));
        first.init().await.unwrap();
        let second = TimestampStore::from_pool(pool, "second", PathBuf::from("/srv/p"));

        first.set_directory_timestamp("", 42).await.unwrap();
        assert_eq!(second.get_directory_timestamp("").await.unwrap(), None);

        assert_eq!(first.clear_project().await.unwrap(), 1);
        assert_eq!(first.get_directory_timestamp("").await.unwrap(), None);
    }
}
