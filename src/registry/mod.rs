//! Content registry - the mutable store populated during discovery.
//!
//! Pages and sections are registered here single-threaded, then the registry
//! is frozen before the parallel render phase. Mutation after `freeze()` is a
//! programming error and fails loudly. `clear()` starts a new registry
//! generation: all maps emptied, URL ownership reset, `epoch` bumped exactly
//! once so stale readers can detect they are looking at a superseded build.

mod entry;

pub use entry::{MetaMap, PageEntry, SectionEntry};

use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::canonical_source_path;
use crate::core::{ClaimPriority, UrlPath};
use crate::ownership::{ClaimOutcome, CollisionError, UrlOwnership};

/// Mutation attempted on a frozen registry.
#[derive(Debug, Clone, Error)]
#[error("registry is frozen (epoch {epoch}): {operation} rejected")]
pub struct RegistryError {
    pub operation: &'static str,
    pub epoch: u64,
}

/// Claim failure surfaced through the registry.
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error(transparent)]
    Frozen(#[from] RegistryError),
    #[error(transparent)]
    Collision(#[from] CollisionError),
}

/// Path/URL-indexed store of pages and sections.
///
/// Page and section URL namespaces are independent: a page and a section may
/// not share a URL within their own kind, but lookups never cross kinds.
#[derive(Debug, Default)]
pub struct ContentRegistry {
    pages_by_path: FxHashMap<std::path::PathBuf, Arc<PageEntry>>,
    pages_by_url: FxHashMap<UrlPath, Arc<PageEntry>>,
    sections_by_path: FxHashMap<std::path::PathBuf, Arc<SectionEntry>>,
    sections_by_url: FxHashMap<UrlPath, Arc<SectionEntry>>,
    url_ownership: UrlOwnership,
    frozen: bool,
    epoch: u64,
}

impl ContentRegistry {
    /// Create an empty, unfrozen registry at epoch 0.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_mutable(&self, operation: &'static str) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError {
                operation,
                epoch: self.epoch,
            });
        }
        Ok(())
    }

    /// Register a page, overwriting any prior entry at the same path.
    ///
    /// Discovery is single-threaded and deterministic per path, so
    /// last-write-wins is safe. If the page's URL changed since a previous
    /// registration, the stale URL mapping is removed.
    pub fn register_page(&mut self, entry: PageEntry) -> Result<(), RegistryError> {
        self.check_mutable("register_page")?;

        let entry = Arc::new(entry);
        if let Some(old) = self
            .pages_by_path
            .insert(entry.source.clone(), Arc::clone(&entry))
            && old.url != entry.url
        {
            self.pages_by_url.remove(&old.url);
        }
        self.pages_by_url.insert(entry.url.clone(), entry);
        Ok(())
    }

    /// Register a section, overwriting any prior entry at the same path.
    pub fn register_section(&mut self, entry: SectionEntry) -> Result<(), RegistryError> {
        self.check_mutable("register_section")?;

        let entry = Arc::new(entry);
        if let Some(old) = self
            .sections_by_path
            .insert(entry.source.clone(), Arc::clone(&entry))
            && old.url != entry.url
        {
            self.sections_by_url.remove(&old.url);
        }
        self.sections_by_url.insert(entry.url.clone(), entry);
        Ok(())
    }

    /// Claim an output URL through the registry's ownership table.
    pub fn claim_url(
        &mut self,
        url: UrlPath,
        owner: impl Into<String>,
        source: impl Into<std::path::PathBuf>,
        priority: ClaimPriority,
    ) -> Result<ClaimOutcome, ClaimError> {
        self.check_mutable("claim_url")?;
        Ok(self.url_ownership.claim(url, owner, source, priority)?)
    }

    /// Look up a page by source path.
    ///
    /// Tries an exact match first, then the canonical form (symlink-resolved,
    /// normalized, case-folded per platform).
    pub fn get_page(&self, path: &Path) -> Option<&Arc<PageEntry>> {
        if let Some(entry) = self.pages_by_path.get(path) {
            return Some(entry);
        }
        self.pages_by_path.get(&canonical_source_path(path))
    }

    /// Look up a page by URL. Exact string match only - URLs are canonical
    /// at registration time.
    pub fn get_page_by_url(&self, url: &UrlPath) -> Option<&Arc<PageEntry>> {
        self.pages_by_url.get(url)
    }

    /// Look up a section by source path (exact then canonical).
    pub fn get_section(&self, path: &Path) -> Option<&Arc<SectionEntry>> {
        if let Some(entry) = self.sections_by_path.get(path) {
            return Some(entry);
        }
        self.sections_by_path.get(&canonical_source_path(path))
    }

    /// Look up a section by URL.
    pub fn get_section_by_url(&self, url: &UrlPath) -> Option<&Arc<SectionEntry>> {
        self.sections_by_url.get(url)
    }

    /// Read access to the URL ownership table.
    pub fn ownership(&self) -> &UrlOwnership {
        &self.url_ownership
    }

    /// Mutable ownership access for cache seeding; frozen-checked like any
    /// other mutation.
    pub fn ownership_mut(&mut self) -> Result<&mut UrlOwnership, RegistryError> {
        self.check_mutable("ownership_mut")?;
        Ok(&mut self.url_ownership)
    }

    /// Freeze the registry before the render phase. Idempotent.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Re-enter discovery (dev-server rebuild path only). Idempotent.
    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    /// Whether the registry is frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Current registry generation. Bumped exactly once per `clear()`.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a new registry generation: empty all maps, reset URL ownership
    /// to a fresh table, bump `epoch`.
    ///
    /// A mutation like any other: fails while frozen. The dev-server rebuild
    /// path calls `unfreeze()` first.
    pub fn clear(&mut self) -> Result<(), RegistryError> {
        self.check_mutable("clear")?;
        self.pages_by_path.clear();
        self.pages_by_url.clear();
        self.sections_by_path.clear();
        self.sections_by_url.clear();
        self.url_ownership = UrlOwnership::new();
        self.epoch += 1;
        Ok(())
    }

    /// Iterate over all registered pages.
    pub fn pages(&self) -> impl Iterator<Item = &Arc<PageEntry>> {
        self.pages_by_path.values()
    }

    /// Iterate over all registered sections.
    pub fn sections(&self) -> impl Iterator<Item = &Arc<SectionEntry>> {
        self.sections_by_path.values()
    }

    /// Number of registered pages.
    pub fn page_count(&self) -> usize {
        self.pages_by_path.len()
    }

    /// Number of registered sections.
    pub fn section_count(&self) -> usize {
        self.sections_by_path.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(source: &str, url: &str) -> PageEntry {
        PageEntry::new(source, UrlPath::from_page(url))
    }

    fn section(source: &str, url: &str) -> SectionEntry {
        SectionEntry::new(source, UrlPath::from_page(url))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ContentRegistry::new();
        registry.register_page(page("content/about.md", "/about/")).unwrap();

        assert!(registry.get_page(Path::new("content/about.md")).is_some());
        assert!(registry.get_page_by_url(&UrlPath::from_page("/about/")).is_some());
        assert_eq!(registry.page_count(), 1);
    }

    #[test]
    fn test_reregister_same_path_replaces_url_mapping() {
        let mut registry = ContentRegistry::new();
        registry.register_page(page("content/about.md", "/about/")).unwrap();
        registry.register_page(page("content/about.md", "/about-us/")).unwrap();

        assert!(registry.get_page_by_url(&UrlPath::from_page("/about/")).is_none());
        assert!(registry.get_page_by_url(&UrlPath::from_page("/about-us/")).is_some());
        assert_eq!(registry.page_count(), 1);
    }

    #[test]
    fn test_page_and_section_url_namespaces_are_independent() {
        let mut registry = ContentRegistry::new();
        registry.register_page(page("content/posts.md", "/posts/")).unwrap();
        registry
            .register_section(section("content/posts/_index.md", "/posts/"))
            .unwrap();

        assert!(registry.get_page_by_url(&UrlPath::from_page("/posts/")).is_some());
        assert!(registry.get_section_by_url(&UrlPath::from_page("/posts/")).is_some());
    }

    #[test]
    fn test_frozen_rejects_mutation() {
        let mut registry = ContentRegistry::new();
        registry.freeze();

        let err = registry.register_page(page("a.md", "/a/")).unwrap_err();
        assert_eq!(err.operation, "register_page");

        assert!(registry.register_section(section("b.md", "/b/")).is_err());
        assert!(registry.ownership_mut().is_err());
        assert!(registry.clear().is_err());
        assert!(matches!(
            registry.claim_url(
                UrlPath::from_page("/a/"),
                "content",
                "a.md",
                ClaimPriority::Content
            ),
            Err(ClaimError::Frozen(_))
        ));
    }

    #[test]
    fn test_unfreeze_reenables_mutation() {
        let mut registry = ContentRegistry::new();
        registry.freeze();
        registry.freeze(); // idempotent
        registry.unfreeze();
        registry.unfreeze(); // idempotent

        assert!(registry.register_page(page("a.md", "/a/")).is_ok());
    }

    #[test]
    fn test_clear_bumps_epoch_exactly_once() {
        let mut registry = ContentRegistry::new();
        assert_eq!(registry.epoch(), 0);

        registry.register_page(page("a.md", "/a/")).unwrap();
        registry.freeze();
        assert_eq!(registry.epoch(), 0); // freeze does not change epoch
        assert!(registry.clear().is_err());
        assert_eq!(registry.epoch(), 0); // rejected clear does not bump

        registry.unfreeze();
        registry.clear().unwrap();
        assert_eq!(registry.epoch(), 1);
        assert_eq!(registry.page_count(), 0);

        registry.clear().unwrap();
        registry.clear().unwrap();
        assert_eq!(registry.epoch(), 3);
    }

    #[test]
    fn test_clear_resets_ownership() {
        let mut registry = ContentRegistry::new();
        registry
            .claim_url(UrlPath::from_page("/a/"), "content", "a.md", ClaimPriority::Content)
            .unwrap();
        assert_eq!(registry.ownership().len(), 1);

        registry.clear().unwrap();
        assert!(registry.ownership().is_empty());
    }

    #[test]
    fn test_canonical_path_fallback() {
        let mut registry = ContentRegistry::new();
        registry.register_page(page("content/about.md", "/about/")).unwrap();

        // Exact miss, canonical hit
        assert!(registry.get_page(Path::new("content/./about.md")).is_some());
        assert!(registry.get_page(Path::new("content/posts/../about.md")).is_some());
    }

    #[test]
    fn test_end_to_end_claim_scenario() {
        // Discovery registers about.md -> /about/ at content priority; a
        // taxonomy generator later tries the same URL at generated priority.
        let mut registry = ContentRegistry::new();
        registry.register_page(page("content/about.md", "/about/")).unwrap();
        let outcome = registry
            .claim_url(
                UrlPath::from_page("/about/"),
                "content",
                "content/about.md",
                ClaimPriority::Content,
            )
            .unwrap();
        assert!(outcome.won());

        let outcome = registry
            .claim_url(
                UrlPath::from_page("/about/"),
                "taxonomy",
                "taxonomy:about",
                ClaimPriority::Generated,
            )
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Lost);

        let claim = registry.ownership().get_claim(&UrlPath::from_page("/about/")).unwrap();
        assert_eq!(claim.owner, "content");
    }
}
