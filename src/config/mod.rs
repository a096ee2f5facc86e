//! Build configuration.
//!
//! Strongly-typed sections parsed from TOML; unknown keys are collected and
//! warned about rather than silently dropped. Every section has a `merge`
//! that layers user values over a base, so layered config files (site config
//! over defaults, CLI profile over site config) compose the same explicit
//! way everywhere instead of through recursive dict merging.
//!
//! # Example
//!
//! ```toml
//! [incremental]
//! enabled = true              # Skip unchanged pages across builds
//! force = false               # Ignore the cache, rebuild everything
//!
//! [fingerprint]
//! content_hash = true         # Hash contents when size+mtime are unchanged
//!
//! [templates]
//! max_depth = 10              # Transitive dependency traversal bound
//!
//! [cache]
//! dir = ".cinder/cache"       # On-disk cache location, relative to root
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use anyhow::Result;

use crate::log;
use crate::snapshot::DEFAULT_MAX_DEPTH;

/// `[incremental]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementalConfig {
    /// Skip pages whose inputs are unchanged since the last build.
    pub enabled: bool,

    /// Rebuild everything regardless of cache state. Every page gets a
    /// FORCED manifest entry.
    pub force: bool,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            force: false,
        }
    }
}

impl IncrementalConfig {
    /// Layer `user` over `base`. Field-wise; later layers win.
    pub fn merge(base: &Self, user: &Self) -> Self {
        Self {
            enabled: user.enabled,
            force: base.force || user.force,
        }
    }
}

/// `[fingerprint]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Verify with a content hash when metadata alone says "unchanged".
    /// Off means size+mtime equality is trusted outright.
    pub content_hash: bool,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self { content_hash: true }
    }
}

impl FingerprintConfig {
    pub fn merge(_base: &Self, user: &Self) -> Self {
        user.clone()
    }
}

/// `[templates]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Bound on transitive extends/include traversal. Cycles deeper than
    /// this are truncated, not fatal.
    pub max_depth: usize,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl TemplatesConfig {
    pub fn merge(base: &Self, user: &Self) -> Self {
        Self {
            max_depth: if user.max_depth == 0 {
                base.max_depth
            } else {
                user.max_depth
            },
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory, relative to the site root.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(crate::cache::CACHE_DIR),
        }
    }
}

impl CacheConfig {
    pub fn merge(base: &Self, user: &Self) -> Self {
        Self {
            dir: if user.dir.as_os_str().is_empty() {
                base.dir.clone()
            } else {
                user.dir.clone()
            },
        }
    }
}

/// Top-level build configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub incremental: IncrementalConfig,
    pub fingerprint: FingerprintConfig,
    pub templates: TemplatesConfig,
    pub cache: CacheConfig,
}

impl BuildConfig {
    /// Parse from TOML, warning about unknown keys.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let (config, ignored) = Self::parse_with_ignored(content)?;
        if !ignored.is_empty() {
            log!("warning"; "unknown config fields ignored: {}", ignored.join(", "));
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Layer `user` over `base`, section by section.
    pub fn merge(base: &Self, user: &Self) -> Self {
        Self {
            incremental: IncrementalConfig::merge(&base.incremental, &user.incremental),
            fingerprint: FingerprintConfig::merge(&base.fingerprint, &user.fingerprint),
            templates: TemplatesConfig::merge(&base.templates, &user.templates),
            cache: CacheConfig::merge(&base.cache, &user.cache),
        }
    }
}
