//! Builds the frozen site snapshot from a frozen registry.
//!
//! Runs exactly once per build generation, single-threaded, between
//! discovery and rendering. The builder borrows the registry read-only and
//! is consumed by `build()`, so there is no way to keep mutating state the
//! snapshot was derived from through the builder itself.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::UrlPath;
use crate::debug;
use crate::registry::{ContentRegistry, MetaMap, SectionEntry};

use super::template::{DEFAULT_MAX_DEPTH, TemplateGraph, TemplateLoader};
use super::{PageSnapshot, SectionSnapshot, SiteSnapshot};

/// Snapshot construction failure.
#[derive(Debug, Clone, Error)]
pub enum SnapshotError {
    /// The registry must be frozen before a snapshot is taken; building from
    /// a registry that discovery can still mutate would race.
    #[error("cannot build snapshot (epoch {epoch}): registry is not frozen")]
    RegistryNotFrozen { epoch: u64 },
}

/// One-shot builder: registry + template loader in, [`SiteSnapshot`] out.
pub struct SnapshotBuilder<'a, L: TemplateLoader> {
    registry: &'a ContentRegistry,
    loader: &'a L,
    max_depth: usize,
}

impl<'a, L: TemplateLoader> SnapshotBuilder<'a, L> {
    pub fn new(registry: &'a ContentRegistry, loader: &'a L) -> Self {
        Self {
            registry,
            loader,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Override the transitive template traversal bound.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Build the snapshot. Single synchronous pass.
    pub fn build(self) -> Result<SiteSnapshot, SnapshotError> {
        if !self.registry.is_frozen() {
            return Err(SnapshotError::RegistryNotFrozen {
                epoch: self.registry.epoch(),
            });
        }

        // Sections first: pages resolve their cascade against these.
        let mut sections_by_url: FxHashMap<UrlPath, Arc<SectionSnapshot>> = FxHashMap::default();
        for entry in self.registry.sections() {
            let cascade = self.resolve_cascade(&entry.url, Some(entry));
            sections_by_url.insert(
                entry.url.clone(),
                Arc::new(SectionSnapshot {
                    source: entry.source.clone(),
                    url: entry.url.clone(),
                    title: entry.title.clone(),
                    template: entry.template.clone(),
                    cascade,
                }),
            );
        }

        let mut pages: Vec<Arc<PageSnapshot>> = Vec::with_capacity(self.registry.page_count());
        for entry in self.registry.pages() {
            let mut meta = self.resolve_cascade(&entry.url, None);
            // Page front matter wins over any cascaded key
            for (key, value) in &entry.meta {
                meta.insert(key.clone(), value.clone());
            }
            let template = entry
                .template
                .clone()
                .or_else(|| self.nearest_section_template(&entry.url));

            pages.push(Arc::new(PageSnapshot {
                source: entry.source.clone(),
                url: entry.url.clone(),
                title: entry.title.clone(),
                template,
                meta,
            }));
        }
        // Deterministic order regardless of map iteration
        pages.sort_by(|a, b| a.url.cmp(&b.url));

        let pages_by_url: FxHashMap<UrlPath, Arc<PageSnapshot>> = pages
            .iter()
            .map(|p| (p.url.clone(), Arc::clone(p)))
            .collect();
        let pages_by_path: FxHashMap<_, _> = pages
            .iter()
            .map(|p| (p.source.clone(), Arc::clone(p)))
            .collect();

        // Template analysis over every template actually referenced.
        let mut roots: Vec<String> = Vec::new();
        for name in pages
            .iter()
            .filter_map(|p| p.template.as_deref())
            .chain(sections_by_url.values().filter_map(|s| s.template.as_deref()))
        {
            if !roots.iter().any(|r| r == name) {
                roots.push(name.to_string());
            }
        }
        let template_graph = TemplateGraph::build(self.loader, roots, self.max_depth);

        // Invert page->template once, then close over dependents per
        // template. Change-impact queries become a single map read.
        let mut pages_by_template: FxHashMap<&str, Vec<Arc<PageSnapshot>>> = FxHashMap::default();
        for page in &pages {
            if let Some(name) = page.template.as_deref() {
                pages_by_template.entry(name).or_default().push(Arc::clone(page));
            }
        }

        // A page whose template chain passes through an unanalyzable
        // template has an unknown true input set, so it rides along with
        // every template change rather than ever being skipped stale.
        let mut conservative_pages: Vec<Arc<PageSnapshot>> = Vec::new();
        for (name, users) in &pages_by_template {
            let unknown_inputs = template_graph.is_conservative(name)
                || template_graph.analysis(name).is_some_and(|a| {
                    a.all_dependencies
                        .iter()
                        .any(|dep| template_graph.is_conservative(dep))
                });
            if unknown_inputs {
                for page in users {
                    if !conservative_pages.iter().any(|p| Arc::ptr_eq(p, page)) {
                        conservative_pages.push(Arc::clone(page));
                    }
                }
            }
        }
        conservative_pages.sort_by(|a, b| a.url.cmp(&b.url));

        let mut template_dependents: FxHashMap<String, Vec<Arc<PageSnapshot>>> =
            FxHashMap::default();
        for name in template_graph.names() {
            let mut affected: Vec<Arc<PageSnapshot>> = Vec::new();
            let mut add_users = |template: &str| {
                if let Some(users) = pages_by_template.get(template) {
                    for page in users {
                        if !affected.iter().any(|p| Arc::ptr_eq(p, page)) {
                            affected.push(Arc::clone(page));
                        }
                    }
                }
            };
            add_users(name);
            for dependent in template_graph.dependents_of(name) {
                add_users(&dependent);
            }
            for page in &conservative_pages {
                if !affected.iter().any(|p| Arc::ptr_eq(p, page)) {
                    affected.push(Arc::clone(page));
                }
            }
            affected.sort_by(|a, b| a.url.cmp(&b.url));
            template_dependents.insert(name.to_string(), affected);
        }

        debug!("snapshot";
            "built snapshot: epoch {}, {} pages, {} sections, {} templates",
            self.registry.epoch(), pages.len(), sections_by_url.len(), template_graph.len());

        Ok(SiteSnapshot {
            epoch: self.registry.epoch(),
            pages,
            pages_by_url,
            pages_by_path,
            sections_by_url,
            template_graph,
            template_dependents,
            conservative_pages,
        })
    }

    /// Merge ancestor section cascades onto `url`, root first so nearer
    /// sections override. `own` is set when resolving a section itself, so
    /// its own cascade lands on top.
    fn resolve_cascade(&self, url: &UrlPath, own: Option<&SectionEntry>) -> MetaMap {
        let mut chain: Vec<&Arc<SectionEntry>> = Vec::new();
        let mut cursor = url.parent();
        while let Some(parent) = cursor {
            if let Some(section) = self.registry.get_section_by_url(&parent) {
                chain.push(section);
            }
            cursor = parent.parent();
        }

        let mut merged = MetaMap::new();
        for section in chain.iter().rev() {
            for (key, value) in &section.cascade {
                merged.insert(key.clone(), value.clone());
            }
        }
        if let Some(own) = own {
            for (key, value) in &own.cascade {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Template default from the nearest ancestor section that names one.
    fn nearest_section_template(&self, url: &UrlPath) -> Option<String> {
        let mut cursor = url.parent();
        while let Some(parent) = cursor {
            if let Some(section) = self.registry.get_section_by_url(&parent)
                && let Some(template) = &section.template
            {
                return Some(template.clone());
            }
            cursor = parent.parent();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PageEntry;
    use std::path::PathBuf;

    struct EmptyLoader;

    impl TemplateLoader for EmptyLoader {
        fn source(&self, _name: &str) -> Option<String> {
            None
        }
        fn resolve(&self, _name: &str) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn test_page_inherits_section_template() {
        let mut registry = ContentRegistry::new();
        let mut section =
            SectionEntry::new("content/posts/_index.md", UrlPath::from_page("/posts/"));
        section.template = Some("post.html".to_string());
        registry.register_section(section).unwrap();

        registry
            .register_page(PageEntry::new(
                "content/posts/a.md",
                UrlPath::from_page("/posts/a/"),
            ))
            .unwrap();
        registry
            .register_page(
                PageEntry::new("content/posts/b.md", UrlPath::from_page("/posts/b/"))
                    .with_template("custom.html"),
            )
            .unwrap();
        registry.freeze();

        let snapshot = SnapshotBuilder::new(&registry, &EmptyLoader).build().unwrap();
        assert_eq!(
            snapshot
                .page_by_url(&UrlPath::from_page("/posts/a/"))
                .unwrap()
                .template
                .as_deref(),
            Some("post.html")
        );
        // Explicit page template is untouched
        assert_eq!(
            snapshot
                .page_by_url(&UrlPath::from_page("/posts/b/"))
                .unwrap()
                .template
                .as_deref(),
            Some("custom.html")
        );
    }

    #[test]
    fn test_pages_sorted_by_url() {
        let mut registry = ContentRegistry::new();
        for name in ["zebra", "alpha", "mid"] {
            registry
                .register_page(PageEntry::new(
                    format!("content/{name}.md"),
                    UrlPath::from_page(&format!("/{name}/")),
                ))
                .unwrap();
        }
        registry.freeze();

        let snapshot = SnapshotBuilder::new(&registry, &EmptyLoader).build().unwrap();
        let urls: Vec<&str> = snapshot.pages().iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, ["/alpha/", "/mid/", "/zebra/"]);
    }

    #[test]
    fn test_error_carries_epoch() {
        let mut registry = ContentRegistry::new();
        registry.clear().unwrap();

        let err = SnapshotBuilder::new(&registry, &EmptyLoader).build().unwrap_err();
        assert!(matches!(err, SnapshotError::RegistryNotFrozen { epoch: 1 }));
    }
}
