// Exclusive per-file write lock.
// A sibling `.lock` file created with O_EXCL; works across processes on one host.
// The file holds its owner's token and is only removed after being renamed aside
// and checked, so a writer never deletes a lock it doesn't own.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::{CacheError, Result};

use super::paths;

const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(5);
const RETRY_MAX_DELAY: Duration = Duration::from_millis(200);

static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Held write lock. The lock file is removed when this is dropped, if it is
/// still ours.
#[derive(Debug)]
pub struct WriteLock {
    path: PathBuf,
    token: String,
}

impl WriteLock {
    /// Acquire the lock guarding `cache_path`, waiting at most `timeout`.
    /// A timeout too large to represent waits without bound.
    ///
    /// A lock file older than `stale_after` is assumed to belong to a writer
    /// that died without cleaning up, and is broken.
    pub fn acquire(cache_path: &Path, timeout: Duration, stale_after: Duration) -> Result<Self> {
        let path = paths::lock_path(cache_path);
        let start = Instant::now();
        let deadline = start.checked_add(timeout);
        let mut delay = RETRY_INITIAL_DELAY;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let token = new_token();
                    let written = file
                        .write_all(token.as_bytes())
                        .and_then(|()| file.sync_all());
                    if let Err(source) = written {
                        // Just created and fresh, so nobody else can have taken it over.
                        let _ = fs::remove_file(&path);
                        return Err(CacheError::Lock { path, source });
                    }
                    return Ok(Self { path, token });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(observed) = stale_contents(&path, stale_after) {
                        if break_stale(&path, &observed, stale_after) {
                            tracing::warn!(
                                path = %path.display(),
                                owner = %observed,
                                "broke abandoned lock file"
                            );
                            continue;
                        }
                    }

                    let now = Instant::now();
                    let wait = match deadline {
                        Some(deadline) if now >= deadline => {
                            return Err(CacheError::LockTimeout {
                                path,
                                waited: now - start,
                            });
                        }
                        Some(deadline) => delay.min(deadline - now),
                        None => delay,
                    };
                    thread::sleep(wait);
                    delay = (delay * 2).min(RETRY_MAX_DELAY);
                }
                Err(source) => return Err(CacheError::Lock { path, source }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let token = self.token.as_str();
        let released = take_if(&self.path, |side| {
            fs::read_to_string(side).is_ok_and(|contents| contents == token)
        });
        if !released {
            tracing::warn!(path = %self.path.display(), "lock file no longer ours, left in place");
        }
    }
}

/// Unique owner token: pid, wall clock nanos, and a per-process counter.
fn new_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let n = TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}.{}.{}", std::process::id(), nanos, n)
}

/// Contents of the lock at `path` if it is older than `stale_after`.
fn stale_contents(path: &Path, stale_after: Duration) -> Option<String> {
    if !is_older_than(path, stale_after) {
        return None;
    }
    fs::read_to_string(path).ok()
}

/// Remove the lock at `path` if it still holds `observed` and is still stale.
///
/// Breakers take turns through a `.break` guard file, and re-check the lock
/// before moving it, so a lock created by whoever broke it first is never
/// touched.
fn break_stale(path: &Path, observed: &str, stale_after: Duration) -> bool {
    let guard = paths::sibling(path, ".break");
    if OpenOptions::new().write(true).create_new(true).open(&guard).is_err() {
        // Left behind by a breaker that crashed mid-break.
        if is_older_than(&guard, stale_after) {
            let _ = fs::remove_file(&guard);
        }
        return false;
    }

    let still_stale = |p: &Path| {
        is_older_than(p, stale_after) && fs::read_to_string(p).is_ok_and(|c| c == observed)
    };
    let broken = still_stale(path) && take_if(path, still_stale);

    let _ = fs::remove_file(&guard);
    broken
}

/// Atomically move the lock aside, then delete it if `owned` accepts it, or
/// put it back otherwise.
fn take_if(path: &Path, owned: impl FnOnce(&Path) -> bool) -> bool {
    let side = paths::sibling(path, &format!(".{}", new_token()));
    if fs::rename(path, &side).is_err() {
        return false;
    }

    if owned(&side) {
        let _ = fs::remove_file(&side);
        return true;
    }

    // hard_link fails rather than clobbering a lock created in the meantime.
    if let Err(e) = fs::hard_link(&side, path) {
        tracing::warn!(path = %path.display(), error = %e, "can't restore lock file");
    }
    let _ = fs::remove_file(&side);
    false
}

fn is_older_than(path: &Path, age: Duration) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|elapsed| elapsed > age)
}
