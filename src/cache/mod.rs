//! On-disk cache persistence for incremental builds.
//!
//! A corrupt, missing or version-mismatched cache file always degrades to
//! "no cache" (full rebuild), never to a build error.

mod store;

/// Cache directory name (inside project root)
pub const CACHE_DIR: &str = ".cinder/cache";

pub use store::{BuildCacheData, CACHE_SCHEMA, load_cache, load_cache_from, save_cache, save_cache_to};
