// probecache: a local TTL cache in front of slow or unreliable instance probes.
// Records live on disk as root/<key>/cache and are refilled on demand.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;

pub use cache::{Cache, CacheRecord, Fetch, Freshness, Lookup, Origin, WithPrevious};
pub use config::{Format, Settings};
pub use error::{CacheError, CodecError, FetchError, Result};
