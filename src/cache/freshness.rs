// Freshness classification for cache files.
// Age is measured from the file's mtime, never from anything stored inside it.

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use crate::error::{CacheError, Result};

/// State of a cache file relative to its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No file on disk.
    Absent,
    /// File exists but is older than the TTL.
    Stale,
    /// File exists and is within the TTL.
    Fresh,
}

impl Freshness {
    pub fn is_fresh(self) -> bool {
        self == Freshness::Fresh
    }
}

/// Classify `path` against `ttl` seconds using the current time.
///
/// A missing file is [`Freshness::Absent`]. Any other metadata failure is
/// returned as [`CacheError::Stat`].
pub fn classify(path: &Path, ttl: f64) -> Result<Freshness> {
    classify_at(path, ttl, SystemTime::now())
}

/// Same as [`classify`] with an explicit "now".
pub fn classify_at(path: &Path, ttl: f64, now: SystemTime) -> Result<Freshness> {
    let stat_err = |source| CacheError::Stat {
        path: path.to_path_buf(),
        source,
    };

    let modified = match fs::metadata(path) {
        Ok(meta) => meta.modified().map_err(stat_err)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Freshness::Absent),
        Err(e) => return Err(stat_err(e)),
    };

    // Written so that a NaN TTL classifies stale.
    if age_secs(modified, now) <= ttl {
        Ok(Freshness::Fresh)
    } else {
        Ok(Freshness::Stale)
    }
}

/// Signed seconds between `modified` and `now`; negative for mtimes in the future.
fn age_secs(modified: SystemTime, now: SystemTime) -> f64 {
    match now.duration_since(modified) {
        Ok(age) => age.as_secs_f64(),
        Err(ahead) => -ahead.duration().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::time::Duration;
    use tempfile::TempDir;

    fn file_with_mtime(dir: &TempDir, mtime: SystemTime) -> std::path::PathBuf {
        let path = dir.path().join("cache");
        fs::write(&path, b"instance_alive: true\ndata: ''\n").unwrap();
        filetime::set_file_mtime(&path, FileTime::from_system_time(mtime)).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("never-written").join("cache");
        assert_eq!(classify(&path, 60.0).unwrap(), Freshness::Absent);
        // Even a TTL that makes everything stale can't turn absent into stale.
        assert_eq!(classify(&path, -1.0).unwrap(), Freshness::Absent);
    }

    #[test]
    fn test_boundary() {
        let temp_dir = TempDir::new().unwrap();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let path = file_with_mtime(&temp_dir, t0);
        let eps = Duration::from_millis(10);
        let ttl = Duration::from_secs(60);

        assert_eq!(
            classify_at(&path, 60.0, t0 + ttl - eps).unwrap(),
            Freshness::Fresh
        );
        assert_eq!(classify_at(&path, 60.0, t0 + ttl).unwrap(), Freshness::Fresh);
        assert_eq!(
            classify_at(&path, 60.0, t0 + ttl + eps).unwrap(),
            Freshness::Stale
        );
    }

    #[test]
    fn test_negative_ttl_is_always_stale() {
        let temp_dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        let path = file_with_mtime(&temp_dir, now);
        assert_eq!(classify_at(&path, -1.0, now).unwrap(), Freshness::Stale);
    }

    #[test]
    fn test_nan_ttl_is_stale() {
        let temp_dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        let path = file_with_mtime(&temp_dir, now);
        assert_eq!(classify_at(&path, f64::NAN, now).unwrap(), Freshness::Stale);
    }

    #[test]
    fn test_future_mtime_is_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        let path = file_with_mtime(&temp_dir, now + Duration::from_secs(3600));
        assert_eq!(classify_at(&path, 60.0, now).unwrap(), Freshness::Fresh);
    }

    #[test]
    fn test_just_written_is_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache");
        fs::write(&path, b"x").unwrap();
        assert!(classify(&path, 60.0).unwrap().is_fresh());
    }

    #[cfg(unix)]
    #[test]
    fn test_not_a_directory_is_stat_error() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        // A path through a regular file fails with ENOTDIR, not ENOENT.
        let err = classify(&file.join("cache"), 60.0).unwrap_err();
        assert!(matches!(err, CacheError::Stat { .. }));
    }
}
