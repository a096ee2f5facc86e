//! Cache of rendered output for generated pages (taxonomies, feeds).
//!
//! Generated pages have no single source file to fingerprint; instead their
//! rendered body is cached keyed by URL plus a hash of the inputs that went
//! into them. Workers both read (did my inputs change?) and write (store the
//! fresh render), so this stays a tier-3 lock through the parallel phase.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::core::UrlPath;
use crate::fingerprint::ContentHash;
use crate::locks::{Tier, TieredRwLock};

/// A cached generated-page render.
#[derive(Debug, Clone)]
pub struct GeneratedPage {
    /// Rendered body (shared, never mutated).
    pub body: Arc<str>,
    /// Hash of the inputs the body was rendered from.
    pub inputs_hash: ContentHash,
}

/// URL-keyed cache of generated-page renders.
#[derive(Debug)]
pub struct GeneratedPageCache {
    pages: TieredRwLock<FxHashMap<UrlPath, GeneratedPage>>,
}

impl GeneratedPageCache {
    pub fn new() -> Self {
        Self {
            pages: TieredRwLock::new(Tier::RenderCache, "generated_pages", FxHashMap::default()),
        }
    }

    /// Get the cached render if its inputs hash still matches.
    pub fn get_fresh(&self, url: &UrlPath, inputs_hash: ContentHash) -> Option<Arc<str>> {
        self.pages
            .read()
            .get(url)
            .filter(|p| p.inputs_hash == inputs_hash)
            .map(|p| Arc::clone(&p.body))
    }

    /// Store a fresh render.
    pub fn insert(&self, url: UrlPath, body: impl Into<Arc<str>>, inputs_hash: ContentHash) {
        self.pages.write().insert(
            url,
            GeneratedPage {
                body: body.into(),
                inputs_hash,
            },
        );
    }

    /// Drop a single entry.
    pub fn invalidate(&self, url: &UrlPath) {
        self.pages.write().remove(url);
    }

    /// Drop everything (full rebuild).
    pub fn clear(&self) {
        self.pages.write().clear();
    }

    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }
}

impl Default for GeneratedPageCache {
    fn default() -> Self {
        Self::new()
    }
}
