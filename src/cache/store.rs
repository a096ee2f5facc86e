//! Versioned build-cache blob: fingerprints, dependency edges, URL claims.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::CACHE_DIR;
use crate::ownership::PersistedClaims;
use crate::tracker::PersistedTracker;

/// Cache file name
const CACHE_FILE: &str = "build.json";

/// Bump on any incompatible change to the serialized shape.
pub const CACHE_SCHEMA: u32 = 1;

/// Everything the next incremental build needs from this one.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BuildCacheData {
    /// Schema version; mismatches discard the cache.
    #[serde(default)]
    pub schema: u32,
    /// URL claims from the prior build (advisory seeds).
    #[serde(default)]
    pub claims: PersistedClaims,
    /// Fingerprints and dependency edges.
    #[serde(default)]
    pub tracker: PersistedTracker,
}

impl BuildCacheData {
    pub fn new(claims: PersistedClaims, tracker: PersistedTracker) -> Self {
        Self {
            schema: CACHE_SCHEMA,
            claims,
            tracker,
        }
    }
}

fn cache_path(root: &Path) -> PathBuf {
    root.join(CACHE_DIR).join(CACHE_FILE)
}

/// Load the persisted cache for a project root (default cache directory).
///
/// Missing, unreadable, corrupt or schema-mismatched files all return the
/// empty default - the build falls back to a full rebuild with at most an
/// informational log line.
pub fn load_cache(root: &Path) -> BuildCacheData {
    load_cache_from(&root.join(CACHE_DIR))
}

/// Load the persisted cache from an explicit cache directory.
pub fn load_cache_from(cache_dir: &Path) -> BuildCacheData {
    let path = cache_dir.join(CACHE_FILE);

    let json = match fs::read_to_string(&path) {
        Ok(json) => json,
        Err(_) => return BuildCacheData::default(),
    };

    match serde_json::from_str::<BuildCacheData>(&json) {
        Ok(data) if data.schema == CACHE_SCHEMA => {
            crate::debug!("cache"; "restored {} claims, {} fingerprints",
                data.claims.claims.len(), data.tracker.fingerprints.len());
            data
        }
        Ok(data) => {
            crate::log!("cache"; "schema changed ({} -> {}), full rebuild", data.schema, CACHE_SCHEMA);
            BuildCacheData::default()
        }
        Err(e) => {
            crate::log!("cache"; "unreadable cache discarded ({}), full rebuild", e);
            BuildCacheData::default()
        }
    }
}

/// Persist the cache atomically under the default cache directory.
pub fn save_cache(root: &Path, data: &BuildCacheData) -> std::io::Result<()> {
    save_cache_to(&root.join(CACHE_DIR), data)
}

/// Persist the cache atomically to an explicit cache directory.
///
/// Writes to a temp file in the cache directory, then renames over the real
/// file, so a concurrent build process never observes a torn cache. Skips
/// the write entirely when the content is unchanged.
pub fn save_cache_to(cache_dir: &Path, data: &BuildCacheData) -> std::io::Result<()> {
    let path = cache_dir.join(CACHE_FILE);

    fs::create_dir_all(&cache_dir)?;

    let json = serde_json::to_string_pretty(data)?;

    if file_content_matches(&path, &json) {
        crate::debug!("cache"; "unchanged, skipping write");
        return Ok(());
    }

    let tmp = cache_dir.join(format!("{CACHE_FILE}.tmp.{}", std::process::id()));
    fs::write(&tmp, &json)?;
    fs::rename(&tmp, &path)?;

    crate::debug!("cache"; "saved {} claims, {} fingerprints",
        data.claims.claims.len(), data.tracker.fingerprints.len());
    Ok(())
}

/// Check if file content is the same as new content
fn file_content_matches(path: &Path, content: &str) -> bool {
    path.exists() && fs::read_to_string(path).is_ok_and(|existing| existing == content)
}
