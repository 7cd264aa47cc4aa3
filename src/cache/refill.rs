// Refill orchestration.
// Serves fresh records from disk, otherwise calls the fetch function and writes back.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::error::{BoxError, CacheError, FetchError};

use super::freshness::{self, Freshness};
use super::paths;
use super::record::CacheRecord;
use super::store;

/// Step narration, only emitted when the settings ask for it.
macro_rules! step {
    ($cache:expr, $($arg:tt)+) => {
        if $cache.settings.debug {
            tracing::debug!($($arg)+);
        }
    };
}

/// Source of fresh data for a cache.
///
/// `previous` is the record currently on disk for the key, stale or not,
/// if it could be read.
pub trait Fetch<C: ?Sized> {
    fn fetch(&self, ctx: &C, previous: Option<&CacheRecord>) -> Result<Vec<u8>, FetchError>;
}

impl<C, F, E> Fetch<C> for F
where
    C: ?Sized,
    F: Fn(&C) -> Result<Vec<u8>, E>,
    E: Into<BoxError>,
{
    fn fetch(&self, ctx: &C, _previous: Option<&CacheRecord>) -> Result<Vec<u8>, FetchError> {
        self(ctx).map_err(FetchError::new)
    }
}

/// Adapter for fetch closures that also want the previous record.
pub struct WithPrevious<F>(pub F);

impl<C, F, E> Fetch<C> for WithPrevious<F>
where
    C: ?Sized,
    F: Fn(&C, Option<&CacheRecord>) -> Result<Vec<u8>, E>,
    E: Into<BoxError>,
{
    fn fetch(&self, ctx: &C, previous: Option<&CacheRecord>) -> Result<Vec<u8>, FetchError> {
        (self.0)(ctx, previous).map_err(FetchError::new)
    }
}

/// Where the record of a [`Lookup`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Read from a fresh cache file.
    Stored,
    /// Produced by calling the fetch function.
    Fetched,
    /// Neither; the record is `alive: false` without a fetch attempt.
    Unavailable,
}

/// Result of [`Cache::lookup`]: the record plus what happened getting it.
#[derive(Debug)]
pub struct Lookup {
    pub record: CacheRecord,
    pub origin: Origin,
    /// Last-write time of the file a stored record was read from.
    pub stored_at: Option<DateTime<Utc>>,
    /// First error swallowed while producing the record.
    pub error: Option<CacheError>,
}

impl Lookup {
    fn unavailable(error: CacheError) -> Self {
        Self {
            record: CacheRecord::dead(),
            origin: Origin::Unavailable,
            stored_at: None,
            error: Some(error),
        }
    }
}

/// File-backed cache in front of a fetch function.
///
/// `C` is the context handed through to the fetch function on every refill.
pub struct Cache<C: ?Sized> {
    settings: Settings,
    fetcher: Option<Box<dyn Fetch<C> + Send + Sync>>,
}

impl<C: ?Sized> Cache<C> {
    /// Create a cache with no fetch function. Every lookup is unavailable
    /// until one is set.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            fetcher: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: impl Fetch<C> + Send + Sync + 'static) -> Self {
        self.set_fetcher(fetcher);
        self
    }

    pub fn set_fetcher(&mut self, fetcher: impl Fetch<C> + Send + Sync + 'static) {
        self.fetcher = Some(Box::new(fetcher));
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get the record for `key`.
    ///
    /// Never fails: every problem turns into `alive: false`.
    pub fn get(&self, key: &str, ctx: &C, force_update: bool) -> CacheRecord {
        self.lookup(key, ctx, force_update).record
    }

    /// Like [`get`](Self::get), also reporting where the record came from and
    /// which error, if any, was swallowed.
    pub fn lookup(&self, key: &str, ctx: &C, force_update: bool) -> Lookup {
        let Some(fetcher) = self.fetcher.as_deref() else {
            return self.unavailable(key, CacheError::NoFetcher);
        };
        if let Err(e) = paths::validate_key(key) {
            return self.unavailable(key, e);
        }

        let path = paths::cache_path(&self.settings.cache_root, key);

        if !force_update {
            step!(self, key, "checking whether cache is fresh");
            match freshness::classify(&path, self.settings.effective_ttl()) {
                Err(e) => return self.unavailable(key, e),
                Ok(Freshness::Fresh) => {
                    return match store::read(&path, self.settings.format) {
                        Ok(record) => {
                            step!(self, key, alive = record.alive, "served from cache");
                            Lookup {
                                record,
                                origin: Origin::Stored,
                                stored_at: store::modified_at(&path).ok(),
                                error: None,
                            }
                        }
                        Err(e) => self.unavailable(key, e),
                    };
                }
                Ok(state) => step!(self, key, ?state, "cache needs refill"),
            }
        }

        let previous = store::read_existing(&path, self.settings.format);

        step!(self, key, force_update, "calling fetch function");
        let (record, mut error) = match fetcher.fetch(ctx, previous.as_ref()) {
            Ok(payload) => (CacheRecord::alive(payload), None),
            Err(e) => {
                tracing::warn!(key, error = %e, "fetch failed");
                (CacheRecord::dead(), Some(CacheError::Fetch(e)))
            }
        };

        step!(self, key, alive = record.alive, "writing record back");
        if let Err(e) = store::write(&self.settings, key, &record) {
            // The fetched record is still returned; only persistence is lost.
            tracing::warn!(key, kind = e.kind(), error = %e, "can't persist cache record");
            error.get_or_insert(e);
        }

        Lookup {
            record,
            origin: Origin::Fetched,
            stored_at: None,
            error,
        }
    }

    /// Drop the stored record for `key` so the next lookup refills.
    ///
    /// Returns whether a record was removed.
    pub fn invalidate(&self, key: &str) -> crate::Result<bool> {
        paths::validate_key(key)?;
        let removed = store::delete(&self.settings, key)?;
        step!(self, key, removed, "invalidated cache");
        Ok(removed)
    }

    fn unavailable(&self, key: &str, error: CacheError) -> Lookup {
        tracing::warn!(key, kind = error.kind(), error = %error, "cache unavailable");
        Lookup::unavailable(error)
    }
}

impl<C: ?Sized> fmt::Debug for Cache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("settings", &self.settings)
            .field("has_fetcher", &self.fetcher.is_some())
            .finish()
    }
}
