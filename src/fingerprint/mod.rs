//! File fingerprints for cheap change detection.
//!
//! A fingerprint is `(size, mtime, content hash)`. Comparing fingerprints is
//! tiered: equal size + mtime means unchanged without reading the file; a
//! differing mtime with an equal content hash (e.g. `touch`, git checkout)
//! still counts as unchanged.

mod hash;

pub use hash::{ContentHash, compute_file_hash};

use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

/// Fingerprint of a tracked input file at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// File size in bytes.
    pub size: u64,
    /// Modification time, milliseconds since the Unix epoch (0 if unknown).
    pub mtime_ms: u64,
    /// blake3 content hash.
    pub hash: ContentHash,
}

impl Fingerprint {
    /// Capture the current fingerprint of a file.
    ///
    /// Returns `None` if the file cannot be read; callers treat a missing
    /// fingerprint as "changed" (never silently skip an unseen file).
    pub fn capture(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }

        let hash = compute_file_hash(path);
        if hash.is_empty() {
            return None;
        }

        Some(Self {
            size: meta.len(),
            mtime_ms: mtime_ms(&meta),
            hash,
        })
    }

    /// Cheap metadata-only match: same size and mtime.
    #[inline]
    pub fn metadata_matches(&self, other: &Self) -> bool {
        self.size == other.size && self.mtime_ms == other.mtime_ms && self.mtime_ms != 0
    }

    /// Full match: metadata short-circuit, then content hash.
    pub fn matches(&self, other: &Self) -> bool {
        self.metadata_matches(other) || self.hash == other.hash
    }

    /// Metadata-only check against the file at `path`: size plus a known,
    /// unchanged mtime. Never reads file contents; an mtime mismatch counts
    /// as changed even if the bytes are identical.
    pub fn still_matches_metadata(&self, path: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        meta.len() == self.size && mtime_ms(&meta) == self.mtime_ms && self.mtime_ms != 0
    }

    /// Check whether the file at `path` still matches this fingerprint.
    ///
    /// Avoids reading file contents when size + mtime are unchanged.
    pub fn still_matches(&self, path: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        if meta.len() != self.size {
            return false;
        }
        if mtime_ms(&meta) == self.mtime_ms && self.mtime_ms != 0 {
            return true;
        }
        compute_file_hash(path) == self.hash
    }
}

fn mtime_ms(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
