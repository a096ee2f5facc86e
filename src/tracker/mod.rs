//! Dependency tracking and cache-invalidation bookkeeping.
//!
//! The tracker owns per-file fingerprints and the page→input dependency
//! graph. It persists across builds (loaded from the on-disk cache, merged,
//! re-saved) and answers the two questions the engine asks on every
//! incremental build: "did this file change?" and "which pages does that
//! affect?".
//!
//! Fingerprint writes from the parallel render phase go through a lock-free
//! pending queue and are folded in single-threaded after the phase ends, so
//! workers never contend on the fingerprint map.

mod graph;

pub use graph::DependencyGraph;

use std::path::{Path, PathBuf};

use crossbeam::queue::SegQueue;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::core::normalize_path;
use crate::fingerprint::Fingerprint;

/// Serialized tracker state for the persisted build cache.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedTracker {
    /// Input file → fingerprint at last build.
    pub fingerprints: FxHashMap<PathBuf, Fingerprint>,
    /// Page → inputs it depended on at last build.
    pub edges: Vec<(PathBuf, Vec<PathBuf>)>,
}

/// Fingerprints plus forward/reverse dependency edges for all tracked files.
#[derive(Debug)]
pub struct DependencyTracker {
    fingerprints: FxHashMap<PathBuf, Fingerprint>,
    graph: DependencyGraph,
    /// Fingerprints recorded by render workers, folded in by
    /// [`drain_pending`](Self::drain_pending) after the parallel phase.
    pending: SegQueue<(PathBuf, Fingerprint)>,
    /// Consult content hashes in change checks. Off means size+mtime
    /// equality is trusted outright (`[fingerprint] content_hash = false`).
    content_hash: bool,
}

impl Default for DependencyTracker {
    fn default() -> Self {
        Self {
            fingerprints: FxHashMap::default(),
            graph: DependencyGraph::default(),
            pending: SegQueue::new(),
            content_hash: true,
        }
    }
}

impl DependencyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle content hashing in change checks; metadata decides alone when
    /// off.
    pub fn set_content_hash(&mut self, content_hash: bool) {
        self.content_hash = content_hash;
    }

    /// Record that `dependent` (a page) reads `depends_on`. Idempotent.
    pub fn record_dependency(&mut self, dependent: &Path, depends_on: &Path) {
        self.graph.add_edge(dependent, depends_on);
    }

    /// Record the full input set for a page, replacing prior edges.
    pub fn record_dependencies(&mut self, page: &Path, inputs: &[PathBuf]) {
        self.graph.record(page, inputs);
    }

    /// Has the file changed since its stored fingerprint?
    ///
    /// A missing stored fingerprint counts as changed - an unseen file is
    /// never silently skipped.
    pub fn is_changed(&self, file: &Path) -> bool {
        let file = normalize_path(file);
        match self.fingerprints.get(&file) {
            Some(stored) if self.content_hash => !stored.still_matches(&file),
            Some(stored) => !stored.still_matches_metadata(&file),
            None => true,
        }
    }

    /// Pages affected by the given changed files: one hop through the
    /// reverse-dependency index. Template changes additionally go through
    /// the snapshot's template dependency graph for transitive closure.
    pub fn get_affected_pages<'a>(
        &self,
        changed_files: impl IntoIterator<Item = &'a Path>,
    ) -> FxHashSet<PathBuf> {
        let mut affected = FxHashSet::default();
        for file in changed_files {
            let file = normalize_path(file);
            if let Some(pages) = self.graph.used_by(&file) {
                affected.extend(pages.iter().cloned());
            }
        }
        affected
    }

    /// Store the fingerprint for a processed file. Single-threaded path.
    pub fn update_file(&mut self, file: &Path, fingerprint: Fingerprint) {
        self.fingerprints.insert(normalize_path(file), fingerprint);
    }

    /// Queue a fingerprint from a render worker. Lock-free; folded in by
    /// [`drain_pending`](Self::drain_pending).
    pub fn queue_fingerprint(&self, file: &Path, fingerprint: Fingerprint) {
        self.pending.push((normalize_path(file), fingerprint));
    }

    /// Fold queued fingerprints into the map. Call once after the parallel
    /// phase; last write wins per file.
    pub fn drain_pending(&mut self) -> usize {
        let mut count = 0;
        while let Some((file, fingerprint)) = self.pending.pop() {
            self.fingerprints.insert(file, fingerprint);
            count += 1;
        }
        if count > 0 {
            crate::debug!("tracker"; "drained {} pending fingerprints, {} inputs tracked",
                count, self.fingerprints.len());
        }
        count
    }

    /// Stored fingerprint for a file, if any.
    pub fn fingerprint(&self, file: &Path) -> Option<&Fingerprint> {
        self.fingerprints.get(&normalize_path(file))
    }

    /// Inputs a page depended on at last record.
    pub fn dependencies_of(&self, page: &Path) -> Option<&FxHashSet<PathBuf>> {
        self.graph.uses(&normalize_path(page))
    }

    /// Number of tracked files.
    pub fn tracked_count(&self) -> usize {
        self.fingerprints.len()
    }

    /// Drop all state (full rebuild).
    pub fn clear(&mut self) {
        self.fingerprints.clear();
        self.graph.clear();
        while self.pending.pop().is_some() {}
    }

    /// Export for the persisted build cache.
    pub fn to_persisted(&self) -> PersistedTracker {
        let mut edges: Vec<(PathBuf, Vec<PathBuf>)> = self
            .graph
            .forward_entries()
            .map(|(page, deps)| {
                let mut deps: Vec<_> = deps.iter().cloned().collect();
                deps.sort();
                (page.clone(), deps)
            })
            .collect();
        edges.sort_by(|a, b| a.0.cmp(&b.0));

        PersistedTracker {
            fingerprints: self.fingerprints.clone(),
            edges,
        }
    }

    /// Merge persisted state from a prior build into this tracker.
    pub fn load_persisted(&mut self, persisted: PersistedTracker) {
        for (file, fingerprint) in persisted.fingerprints {
            self.fingerprints.entry(file).or_insert(fingerprint);
        }
        for (page, deps) in persisted.edges {
            if self.graph.uses(&page).is_none() {
                self.graph.record(&page, &deps);
            }
        }
    }
}
