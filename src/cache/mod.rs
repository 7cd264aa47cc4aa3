// Cache module for the file-backed probe cache.
// One record file per key, refilled through a caller-supplied fetch function.

pub mod freshness;
pub mod lock;
pub mod paths;
pub mod record;
pub mod refill;
pub mod store;

pub use freshness::{Freshness, classify};
pub use record::CacheRecord;
pub use refill::{Cache, Fetch, Lookup, Origin, WithPrevious};
