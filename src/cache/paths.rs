// Cache path utilities.
// Maps a cache key to its directory and file under the cache root: root/<key>/cache.

use std::path::{Path, PathBuf};

use crate::error::{CacheError, Result};

/// Name of the record file inside a key's directory.
pub const CACHE_FILE_NAME: &str = "cache";

/// Check that `key` names exactly one directory directly below the root.
pub fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(CacheError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Path to a key's directory.
pub fn key_dir(root: &Path, key: &str) -> PathBuf {
    root.join(key)
}

/// Path to a key's record file.
pub fn cache_path(root: &Path, key: &str) -> PathBuf {
    key_dir(root, key).join(CACHE_FILE_NAME)
}

/// Sibling of `path` with `suffix` appended to its file name.
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Path to the lock file guarding writes to `cache_path`.
pub fn lock_path(cache_path: &Path) -> PathBuf {
    sibling(cache_path, ".lock")
}

/// Path of the temp file a new record is written to before it replaces `cache_path`.
pub fn temp_path(cache_path: &Path) -> PathBuf {
    sibling(cache_path, ".tmp")
}
