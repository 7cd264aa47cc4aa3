// Error types for probecache.
// Covers freshness checks, store I/O, document codecs, locking, and fetch failures.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Boxed error returned by a fetch function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("no fetch function configured")]
    NoFetcher,

    #[error("invalid cache key {0:?}")]
    InvalidKey(String),

    #[error("can't stat cache file {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't read cache file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't decode cache file {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("can't serialize cache record: {0}")]
    Encode(#[source] CodecError),

    #[error("can't create cache dir {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't create lock file {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {waited:?} waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("can't write cache file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't load settings from {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

impl CacheError {
    /// Whether this error only means the stored record can't be used.
    pub fn is_miss(&self) -> bool {
        matches!(
            self,
            CacheError::Stat { .. } | CacheError::Read { .. } | CacheError::Decode { .. }
        )
    }

    /// Short, stable name of the error kind for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::NoFetcher => "no_fetcher",
            CacheError::InvalidKey(_) => "invalid_key",
            CacheError::Stat { .. } => "stat",
            CacheError::Read { .. } => "read",
            CacheError::Decode { .. } => "decode",
            CacheError::Fetch(_) => "fetch",
            CacheError::Encode(_) => "encode",
            CacheError::CreateDir { .. } => "create_dir",
            CacheError::Lock { .. } => "lock",
            CacheError::LockTimeout { .. } => "lock_timeout",
            CacheError::Write { .. } => "write",
            CacheError::Config { .. } => "config",
        }
    }
}

/// Failure to encode or decode the persisted document.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not valid base64: {0}")]
    Payload(#[from] base64::DecodeError),
}

/// Failure reported by a fetch function.
#[derive(Debug)]
pub struct FetchError(BoxError);

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl FetchError {
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self(error.into())
    }

    pub fn into_inner(self) -> BoxError {
        self.0
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
