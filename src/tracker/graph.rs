//! Bidirectional dependency graph for incremental builds.
//!
//! Maintains both forward (page → inputs) and reverse (input → pages)
//! mappings for efficient lookups in either direction.
//!
//! # Invariants
//! - Forward and reverse mappings are always consistent
//! - Paths are normalized for reliable matching
//! - Self-references are excluded

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};

use crate::core::normalize_path;

type PathSet = FxHashSet<PathBuf>;
type PathSetMap = FxHashMap<PathBuf, PathSet>;

/// Forward/reverse dependency edges between pages and their input files.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Forward: page → its inputs (templates, data files, includes)
    forward: PathSetMap,
    /// Reverse: input → pages that use it
    reverse: PathSetMap,
}

impl DependencyGraph {
    /// Create an empty dependency graph.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single edge: `page` depends on `input`. Idempotent.
    pub fn add_edge(&mut self, page: &Path, input: &Path) {
        let page = normalize_path(page);
        let input = normalize_path(input);
        if page == input {
            return;
        }

        self.reverse
            .entry(input.clone())
            .or_default()
            .insert(page.clone());
        self.forward.entry(page).or_default().insert(input);
    }

    /// Record the full input set for a page, replacing any prior edges.
    ///
    /// Paths are normalized; the page itself is excluded.
    pub fn record(&mut self, page: &Path, inputs: &[PathBuf]) {
        let page = normalize_path(page);

        // Remove old mappings first (maintains invariant)
        self.remove_page(&page);

        let deps: PathSet = inputs
            .iter()
            .map(|p| normalize_path(p))
            .filter(|p| p.as_path() != page.as_path())
            .collect();

        for dep in &deps {
            self.reverse
                .entry(dep.clone())
                .or_default()
                .insert(page.clone());
        }

        self.forward.insert(page, deps);
    }

    /// Get pages that depend on the given input file.
    #[inline]
    pub fn used_by(&self, input: &Path) -> Option<&PathSet> {
        self.reverse.get(input)
    }

    /// Get inputs a page depends on.
    #[inline]
    pub fn uses(&self, page: &Path) -> Option<&PathSet> {
        self.forward.get(page)
    }

    /// Clear all mappings.
    #[inline]
    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }

    /// Number of tracked inputs (for debugging).
    #[inline]
    pub fn reverse_count(&self) -> usize {
        self.reverse.len()
    }

    /// Iterate forward edges for persistence.
    pub fn forward_entries(&self) -> impl Iterator<Item = (&PathBuf, &PathSet)> {
        self.forward.iter()
    }

    /// Remove a page and clean up its reverse mappings.
    fn remove_page(&mut self, page: &Path) {
        let Some(old_deps) = self.forward.remove(page) else {
            return;
        };

        for dep in old_deps {
            if let Some(dependents) = self.reverse.get_mut(&dep) {
                dependents.remove(page);
                if dependents.is_empty() {
                    self.reverse.remove(&dep);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn new_graph_is_empty() {
        let graph = DependencyGraph::new();
        assert!(graph.used_by(&path("/any.md")).is_none());
    }

    #[test]
    fn basic_recording() {
        let mut graph = DependencyGraph::new();

        let page = path("/site/content/index.md");
        let template = path("/site/templates/base.html");

        graph.record(&page, std::slice::from_ref(&template));

        let users = graph.used_by(&template).unwrap();
        assert!(users.contains(&page));
    }

    #[test]
    fn add_edge_is_idempotent() {
        let mut graph = DependencyGraph::new();

        let page = path("/site/content/index.md");
        let data = path("/site/data/authors.toml");

        graph.add_edge(&page, &data);
        graph.add_edge(&page, &data);

        assert_eq!(graph.used_by(&data).unwrap().len(), 1);
        assert_eq!(graph.uses(&page).unwrap().len(), 1);
    }

    #[test]
    fn self_reference_excluded() {
        let mut graph = DependencyGraph::new();

        let page = path("/site/content/index.md");
        let template = path("/site/templates/base.html");

        graph.record(&page, &[page.clone(), template.clone()]);

        assert!(graph.used_by(&page).is_none());
        assert!(graph.used_by(&template).unwrap().contains(&page));

        graph.add_edge(&page, &page);
        assert!(graph.used_by(&page).is_none());
    }

    #[test]
    fn update_replaces_old_dependencies() {
        let mut graph = DependencyGraph::new();

        let page = path("/site/content/index.md");
        let old_template = path("/site/templates/old.html");
        let new_template = path("/site/templates/new.html");

        graph.record(&page, std::slice::from_ref(&old_template));
        assert!(graph.used_by(&old_template).is_some());

        graph.record(&page, std::slice::from_ref(&new_template));

        assert!(graph.used_by(&old_template).is_none());
        assert!(graph.used_by(&new_template).unwrap().contains(&page));
    }

    #[test]
    fn multiple_pages_share_dependency() {
        let mut graph = DependencyGraph::new();

        let page1 = path("/site/content/a.md");
        let page2 = path("/site/content/b.md");
        let shared = path("/site/templates/shared.html");

        graph.record(&page1, std::slice::from_ref(&shared));
        graph.record(&page2, std::slice::from_ref(&shared));

        let users = graph.used_by(&shared).unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.contains(&page1));
        assert!(users.contains(&page2));
    }

    #[test]
    fn normalized_paths_match() {
        let mut graph = DependencyGraph::new();

        graph.add_edge(
            &path("content/./a.md"),
            &path("templates/../templates/base.html"),
        );

        assert!(
            graph
                .used_by(&path("templates/base.html"))
                .unwrap()
                .contains(&path("content/a.md"))
        );
    }

    #[test]
    fn clear_removes_all() {
        let mut graph = DependencyGraph::new();

        let template = path("/templates/base.html");
        graph.record(&path("/a.md"), std::slice::from_ref(&template));
        graph.record(&path("/c.md"), std::slice::from_ref(&path("/d.toml")));

        graph.clear();

        assert!(graph.used_by(&template).is_none());
        assert_eq!(graph.reverse_count(), 0);
    }
}
