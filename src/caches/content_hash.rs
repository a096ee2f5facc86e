//! Content-hash registry shared by render workers.

use dashmap::DashMap;
use std::path::{Path, PathBuf};

use crate::fingerprint::{ContentHash, compute_file_hash};

/// Thread-safe cache of file content hashes.
///
/// Render workers hash the same templates and data files over and over; this
/// keeps each file hashed at most once per build. Sharded internally
/// (dashmap), so it never holds a whole-map lock while hashing.
#[derive(Debug, Default)]
pub struct ContentHashRegistry {
    hashes: DashMap<PathBuf, ContentHash>,
}

impl ContentHashRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached hash for a file, if present.
    pub fn get(&self, path: &Path) -> Option<ContentHash> {
        let canonical = path.canonicalize().ok()?;
        self.hashes.get(&canonical).map(|r| *r)
    }

    /// Hash a file, returning the cached value when available.
    pub fn hash_file(&self, path: &Path) -> ContentHash {
        let Ok(canonical) = path.canonicalize() else {
            // Nonexistent files are never cached
            return compute_file_hash(path);
        };
        if let Some(cached) = self.hashes.get(&canonical) {
            return *cached;
        }
        let hash = compute_file_hash(&canonical);
        if !hash.is_empty() {
            self.hashes.insert(canonical, hash);
        }
        hash
    }

    /// Drop the cached hash for a file (it changed on disk).
    pub fn invalidate(&self, path: &Path) {
        if let Ok(canonical) = path.canonicalize() {
            self.hashes.remove(&canonical);
        }
    }

    /// Drop all cached hashes.
    pub fn clear(&self) {
        self.hashes.clear();
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
