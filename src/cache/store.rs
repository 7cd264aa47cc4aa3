// Cache store for reading and writing cache records.
// Reads are lock-free; writes take the key's lock and replace the file atomically.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::config::{Format, Settings};
use crate::error::{CacheError, Result};

use super::lock::WriteLock;
use super::paths;
use super::record::{self, CacheRecord};

#[cfg(unix)]
const DIR_MODE: u32 = 0o750;
#[cfg(unix)]
const FILE_MODE: u32 = 0o640;

/// Read and decode the record at `path`.
///
/// Freshness is not checked here.
pub fn read(path: &Path, format: Format) -> Result<CacheRecord> {
    let bytes = fs::read(path).map_err(|source| CacheError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    record::decode(&bytes, format).map_err(|source| CacheError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Read the record at `path` if there is a usable one.
pub fn read_existing(path: &Path, format: Format) -> Option<CacheRecord> {
    match read(path, format) {
        Ok(record) => Some(record),
        Err(CacheError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::debug!(error = %e, "previous record unavailable");
            None
        }
    }
}

/// Persist `record` for `key` under the settings' cache root.
///
/// The key directory is created if needed. The write happens under the
/// key's lock, into a temp file that is then renamed over the record file.
pub fn write(settings: &Settings, key: &str, record: &CacheRecord) -> Result<()> {
    let bytes = record::encode(record, settings.format).map_err(CacheError::Encode)?;

    let dir = paths::key_dir(&settings.cache_root, key);
    create_dir(&dir)?;

    let path = paths::cache_path(&settings.cache_root, key);
    let _lock = WriteLock::acquire(&path, settings.lock_timeout, settings.lock_stale_after)?;

    let temp_path = paths::temp_path(&path);
    let result = write_file(&temp_path, &bytes).and_then(|()| fs::rename(&temp_path, &path));
    if let Err(source) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(CacheError::Write { path, source });
    }

    Ok(())
}

/// Remove the record file for `key`, under the key's lock.
///
/// Returns whether a file was removed.
pub fn delete(settings: &Settings, key: &str) -> Result<bool> {
    let path = paths::cache_path(&settings.cache_root, key);
    if !paths::key_dir(&settings.cache_root, key).is_dir() {
        return Ok(false);
    }

    let _lock = WriteLock::acquire(&path, settings.lock_timeout, settings.lock_stale_after)?;
    match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(CacheError::Write { path, source }),
    }
}

/// When the record at `path` was last written.
pub fn modified_at(path: &Path) -> io::Result<DateTime<Utc>> {
    let modified: SystemTime = fs::metadata(path)?.modified()?;
    Ok(modified.into())
}

fn create_dir(dir: &Path) -> Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir).map_err(|source| CacheError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }

    let mut file: File = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
    }
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings(temp_dir: &TempDir) -> Settings {
        Settings::with_root(temp_dir.path().join("root"))
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let settings = settings(&temp_dir);

        let records = [
            CacheRecord::alive(b"hello".to_vec()),
            CacheRecord::dead(),
            CacheRecord::alive(vec![0, 255, 10]),
            CacheRecord::alive(Vec::new()),
        ];
        for record in records {
            write(&settings, "svc", &record).unwrap();

            let path = paths::cache_path(&settings.cache_root, "svc");
            assert_eq!(read(&path, settings.format).unwrap(), record);
        }
    }

    #[test]
    fn test_write_leaves_no_side_files() {
        let temp_dir = TempDir::new().unwrap();
        let settings = settings(&temp_dir);
        write(&settings, "svc", &CacheRecord::alive(b"x".to_vec())).unwrap();

        let dir = paths::key_dir(&settings.cache_root, "svc");
        let names: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![paths::CACHE_FILE_NAME.to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_modes() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let settings = settings(&temp_dir);
        write(&settings, "svc", &CacheRecord::alive(b"x".to_vec())).unwrap();

        let file = paths::cache_path(&settings.cache_root, "svc");
        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, FILE_MODE);

        let dir = paths::key_dir(&settings.cache_root, "svc");
        let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & 0o007, 0, "no world access on {mode:o}");
    }

    #[test]
    fn test_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("svc").join("cache");

        let err = read(&path, Format::Yaml).unwrap_err();
        assert!(matches!(err, CacheError::Read { .. }));
        assert!(read_existing(&path, Format::Yaml).is_none());
    }

    #[test]
    fn test_read_corrupt_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache");
        fs::write(&path, b"instance_alive: [unterminated").unwrap();

        let err = read(&path, Format::Yaml).unwrap_err();
        assert!(matches!(err, CacheError::Decode { .. }));
        assert!(err.is_miss());
    }

    #[test]
    fn test_json_format() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            format: Format::Json,
            ..settings(&temp_dir)
        };
        write(&settings, "svc", &CacheRecord::alive(b"hello".to_vec())).unwrap();

        let path = paths::cache_path(&settings.cache_root, "svc");
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with('{'));
        assert_eq!(read(&path, Format::Json).unwrap().payload, b"hello");
    }

    #[test]
    fn test_write_times_out_on_held_lock() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            lock_timeout: Duration::from_millis(50),
            ..settings(&temp_dir)
        };
        write(&settings, "svc", &CacheRecord::alive(b"old".to_vec())).unwrap();

        let path = paths::cache_path(&settings.cache_root, "svc");
        let _held = WriteLock::acquire(&path, Duration::ZERO, settings.lock_stale_after).unwrap();

        let err = write(&settings, "svc", &CacheRecord::alive(b"new".to_vec())).unwrap_err();
        assert!(matches!(err, CacheError::LockTimeout { .. }));
        assert_eq!(read(&path, settings.format).unwrap().payload, b"old");
    }

    #[test]
    fn test_root_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        fs::write(&root, b"not a dir").unwrap();

        let err = write(&Settings::with_root(&root), "svc", &CacheRecord::dead()).unwrap_err();
        assert!(matches!(err, CacheError::CreateDir { .. }));
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let settings = settings(&temp_dir);
        assert!(!delete(&settings, "svc").unwrap());

        write(&settings, "svc", &CacheRecord::alive(b"x".to_vec())).unwrap();
        assert!(delete(&settings, "svc").unwrap());
        assert!(!paths::cache_path(&settings.cache_root, "svc").exists());
        assert!(!delete(&settings, "svc").unwrap());
    }

    #[test]
    fn test_modified_at() {
        let temp_dir = TempDir::new().unwrap();
        let settings = settings(&temp_dir);
        write(&settings, "svc", &CacheRecord::dead()).unwrap();

        let path = paths::cache_path(&settings.cache_root, "svc");
        let at = modified_at(&path).unwrap();
        assert!(Utc::now().signed_duration_since(at) < chrono::Duration::seconds(60));
    }
}
