use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path contains unsupported component: {0}")]
    UnsupportedComponent(String),
    #[error("path is not inside the project root: {0}")]
    OutsideRoot(String),
}

/// Maps a project-relative path ("lib/a.php") under `local_root`.
pub fn local_path_for(local_root: &Path, relative: &str) -> Result<PathBuf, PathError> {
    let mut out = local_root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::CurDir => continue,
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent(relative.to_string()));
            }
        }
    }
    Ok(out)
}

/// Inverse of [`local_path_for`]; separators are normalized to `/`.
pub fn relative_path_of(local_root: &Path, path: &Path) -> Result<String, PathError> {
    let rest = path
        .strip_prefix(local_root)
        .map_err(|_| PathError::OutsideRoot(path.display().to_string()))?;
    let mut parts = Vec::new();
    for component in rest.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => continue,
            _ => return Err(PathError::UnsupportedComponent(path.display().to_string())),
        }
    }
    Ok(parts.join("/"))
}

/// Joins a project-relative path onto the remote root ("/www" + "a.php").
pub fn remote_path_for(remote_root: &str, relative: &str) -> String {
    let root = remote_root.trim_end_matches('/');
    if relative.is_empty() {
        return if root.is_empty() { "/".to_string() } else { root.to_string() };
    }
    format!("{root}/{}", relative.trim_start_matches('/'))
}

/// Project-relative path of a remote path, `None` when outside the root.
pub fn relative_remote_path(remote_root: &str, remote_path: &str) -> Option<String> {
    let root = remote_root.trim_end_matches('/');
    let rest = remote_path.strip_prefix(root)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    Some(rest.trim_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_relative_path_under_root() {
        let root = PathBuf::from("/srv/project");
        let mapped = local_path_for(&root, "lib/a.php").unwrap();
        assert_eq!(mapped, PathBuf::from("/srv/project/lib/a.php"));
        assert_eq!(local_path_for(&root, "").unwrap(), root);
    }

    #[test]
    fn rejects_parent_dir() {
        let root = PathBuf::from("/srv/project");
        assert!(matches!(
            local_path_for(&root, "../secret"),
            Err(PathError::UnsupportedComponent(_))
        ));
    }

    #[test]
    fn relative_path_round_trips_for_nested_file() {
        let root = PathBuf::from("/srv/project");
        let path = root.join("lib").join("a.php");
        assert_eq!(relative_path_of(&root, &path).unwrap(), "lib/a.php");
        assert_eq!(relative_path_of(&root, &root).unwrap(), "");
        assert!(relative_path_of(&root, Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn joins_remote_paths() {
        assert_eq!(remote_path_for("/www/", "lib/a.php"), "/www/lib/a.php");
        assert_eq!(remote_path_for("/", "a.php"), "/a.php");
        assert_eq!(remote_path_for("/www", ""), "/www");
        assert_eq!(remote_path_for("/", ""), "/");
    }

    #[test]
    fn strips_remote_root() {
        assert_eq!(
            relative_remote_path("/www", "/www/lib/a.php").as_deref(),
            Some("lib/a.php")
        );
        assert_eq!(relative_remote_path("/", "/a.php").as_deref(), Some("a.php"));
        assert_eq!(relative_remote_path("/www", "/www").as_deref(), Some(""));
        assert_eq!(relative_remote_path("/www", "/wwwx/a"), None);
    }
}
