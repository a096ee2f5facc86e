//! Immutable site snapshot shared by render workers.
//!
//! Everything here is built once, between discovery and rendering, and never
//! mutated afterwards. Workers hold an `Arc<SiteSnapshot>` and read freely
//! with no locking. Mutability after the freeze is a type-level non-option:
//! the builder is consumed, the snapshot exposes only shared references.

mod builder;
mod template;

pub use builder::{SnapshotBuilder, SnapshotError};
pub use template::{DEFAULT_MAX_DEPTH, TemplateAnalysis, TemplateGraph, TemplateLoader};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::core::UrlPath;
use crate::registry::MetaMap;

/// Frozen view of one page, cascade already applied.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub source: PathBuf,
    pub url: UrlPath,
    pub title: Option<String>,
    /// Template the page renders with, after section defaults are applied.
    pub template: Option<String>,
    /// Front matter merged over every ancestor section cascade,
    /// nearer sections winning, the page's own keys winning over all.
    pub meta: MetaMap,
}

/// Frozen view of one section.
#[derive(Debug, Clone)]
pub struct SectionSnapshot {
    pub source: PathBuf,
    pub url: UrlPath,
    pub title: Option<String>,
    pub template: Option<String>,
    /// Fully resolved cascade for this section (its ancestors merged in).
    pub cascade: MetaMap,
}

/// The complete frozen site: pages, sections, template graph.
#[derive(Debug)]
pub struct SiteSnapshot {
    /// Registry generation this snapshot was built from.
    epoch: u64,
    pages: Vec<Arc<PageSnapshot>>,
    pages_by_url: FxHashMap<UrlPath, Arc<PageSnapshot>>,
    pages_by_path: FxHashMap<PathBuf, Arc<PageSnapshot>>,
    sections_by_url: FxHashMap<UrlPath, Arc<SectionSnapshot>>,
    template_graph: TemplateGraph,
    /// Template name → pages affected when that template changes. Covers
    /// transitive dependents, computed once at build time.
    template_dependents: FxHashMap<String, Vec<Arc<PageSnapshot>>>,
    /// Pages whose template chain includes an unanalyzable template. Their
    /// true input set is unknown, so every template change affects them.
    conservative_pages: Vec<Arc<PageSnapshot>>,
}

impl SiteSnapshot {
    /// Registry generation this snapshot belongs to. Readers compare against
    /// the live registry epoch to detect a superseded build.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// All pages, in URL order.
    pub fn pages(&self) -> &[Arc<PageSnapshot>] {
        &self.pages
    }

    pub fn page_by_url(&self, url: &UrlPath) -> Option<&Arc<PageSnapshot>> {
        self.pages_by_url.get(url)
    }

    pub fn page_by_path(&self, path: &Path) -> Option<&Arc<PageSnapshot>> {
        self.pages_by_path.get(path)
    }

    pub fn section_by_url(&self, url: &UrlPath) -> Option<&Arc<SectionSnapshot>> {
        self.sections_by_url.get(url)
    }

    pub fn template_graph(&self) -> &TemplateGraph {
        &self.template_graph
    }

    /// Pages that must re-render when the template at `template_path`
    /// changes.
    ///
    /// One map lookup against the precomputed dependents index, never a scan
    /// over pages. The path is first resolved to a template name through the
    /// graph's path table; if that misses (themed directories, symlinked
    /// template roots), the file name is matched against known template
    /// names as a fallback. An unanalyzable template returns all pages,
    /// trading wasted renders for never-stale output; an unknown path still
    /// hits the pages riding on unanalyzable templates, since the file may
    /// be one of their hidden inputs.
    pub fn pages_affected_by_template_change(&self, template_path: &Path) -> Vec<Arc<PageSnapshot>> {
        let name = self
            .template_graph
            .name_by_path(template_path)
            .map(str::to_string)
            .or_else(|| self.fallback_template_name(template_path));

        match name {
            Some(name) if self.template_graph.is_conservative(&name) => self.pages.clone(),
            Some(name) => self
                .template_dependents
                .get(&name)
                .cloned()
                .unwrap_or_default(),
            None => self.conservative_pages.clone(),
        }
    }

    /// Match a path against known template names by suffix. Handles loaders
    /// that resolve names to a different root than the watcher reports.
    fn fallback_template_name(&self, path: &Path) -> Option<String> {
        let path_str = path.to_string_lossy();
        self.template_graph
            .names()
            .find(|name| path_str.ends_with(*name))
            .map(str::to_string)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn section_count(&self) -> usize {
        self.sections_by_url.len()
    }
}
