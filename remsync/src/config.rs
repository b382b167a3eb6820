use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::sync::timestamps::default_db_path;

const DEFAULT_REMOTE_ROOT: &str = "/";
const DEFAULT_LIST_PAGE_SIZE: u64 = 200;
const DEFAULT_LIST_RETRIES: u64 = 3;
const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub local_root: PathBuf,
    pub remote_url: String,
    pub remote_root: String,
    pub token: String,
    pub project: String,
    pub db_path: PathBuf,
    pub list_page_size: u32,
    pub list_retries: u32,
    pub transfer_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let local_root = match lookup("REMSYNC_LOCAL_ROOT") {
            Some(value) => expand_with_home(&value, &home),
            None => std::env::current_dir().context("current directory is unavailable")?,
        };
        let remote_url = lookup("REMSYNC_REMOTE_URL").context("REMSYNC_REMOTE_URL is not set")?;
        let token = lookup("REMSYNC_TOKEN").context("REMSYNC_TOKEN is not set")?;
        let remote_root =
            lookup("REMSYNC_REMOTE_ROOT").unwrap_or_else(|| DEFAULT_REMOTE_ROOT.to_string());
        let project = lookup("REMSYNC_PROJECT")
            .unwrap_or_else(|| local_root.to_string_lossy().into_owned());
        let db_path = match lookup("REMSYNC_DB_PATH") {
            Some(value) => expand_with_home(&value, &home),
            None => default_db_path().context("cannot resolve timestamp database path")?,
        };
        let list_page_size =
            read_u32(&lookup, "REMSYNC_LIST_PAGE_SIZE", DEFAULT_LIST_PAGE_SIZE, 1);
        let list_retries = read_u32(&lookup, "REMSYNC_LIST_RETRIES", DEFAULT_LIST_RETRIES, 0);
        let transfer_timeout = Duration::from_secs(u64::from(read_u32(
            &lookup,
            "REMSYNC_TRANSFER_TIMEOUT_SECS",
            DEFAULT_TRANSFER_TIMEOUT_SECS,
            1,
        )));

        Ok(Self {
            local_root,
            remote_url,
            remote_root,
            token,
            project,
            db_path,
            list_page_size,
            list_retries,
            transfer_timeout,
        })
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

/// Values below `min` or not parseable fall back to `default`.
fn read_u32<F>(lookup: &F, name: &str, default: u64, min: u64) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value >= min)
        .unwrap_or(default);
    u32::try_from(value).unwrap_or(u32::MAX)
}
