//! Build orchestration.
//!
//! `BuildContext` owns every piece of mutable build state: the registry,
//! the dependency tracker, the tier-3 caches and the config. There are no
//! module-level singletons; components get what they need by reference.
//!
//! A build runs in fixed phases:
//!
//! 1. `load_cache()` seeds the tracker and URL ownership from the prior
//!    build's persisted cache.
//! 2. Discovery (driven by the caller) registers pages/sections and claims
//!    URLs through `registry_mut()`. Single-threaded.
//! 3. `seal()` freezes the registry, builds the immutable snapshot and
//!    publishes it. This is the barrier between discovery and rendering.
//! 4. `render()` runs the worker pool. Workers read the snapshot freely,
//!    push fingerprints to the tracker's lock-free queue and never mutate
//!    the registry.
//! 5. `persist()` folds queued fingerprints in and writes the cache back.
//!
//! For a dev-server rebuild, `start_new_generation()` unfreezes and clears
//! the registry (bumping its epoch so superseded readers notice) and the
//! cycle repeats.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context as _, Result};
use arc_swap::ArcSwapOption;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde_json::json;

use crate::cache::{self, BuildCacheData};
use crate::caches::{ContentHashRegistry, GeneratedPageCache, ProvenanceStore};
use crate::config::BuildConfig;
use crate::fingerprint::Fingerprint;
use crate::manifest::{RebuildManifest, RebuildReason};
use crate::registry::ContentRegistry;
use crate::snapshot::{PageSnapshot, SiteSnapshot, SnapshotBuilder, TemplateLoader};
use crate::tracker::DependencyTracker;
use crate::{debug, log};
use crate::logger::ProgressLine;

/// Renders one page to its output location.
///
/// Implemented by the markdown/template engine adapter. Must be `Sync`:
/// workers call it concurrently for different pages.
pub trait PageRenderer: Sync {
    fn render(&self, page: &PageSnapshot, snapshot: &SiteSnapshot) -> Result<()>;
}

/// Data-file extensions whose changes get their own manifest reason.
const DATA_EXTENSIONS: &[&str] = &["toml", "json", "yaml", "yml", "csv"];

enum PageOutcome {
    Rebuilt {
        source: PathBuf,
        reason: RebuildReason,
        trigger: &'static str,
        duration_ms: f64,
    },
    CacheHit {
        source: PathBuf,
    },
    Failed {
        source: PathBuf,
        error: String,
    },
    Superseded,
}

/// Owner of all mutable build state.
pub struct BuildContext {
    root: PathBuf,
    config: BuildConfig,
    registry: ContentRegistry,
    tracker: DependencyTracker,
    content_hashes: ContentHashRegistry,
    provenance: ProvenanceStore,
    generated: GeneratedPageCache,
    /// Published snapshot for the current build generation. `None` until
    /// `seal()` runs; swapped, never mutated in place.
    snapshot: ArcSwapOption<SiteSnapshot>,
}

impl BuildContext {
    pub fn new(root: impl Into<PathBuf>, config: BuildConfig) -> Self {
        let mut tracker = DependencyTracker::new();
        tracker.set_content_hash(config.fingerprint.content_hash);
        Self {
            root: root.into(),
            config,
            registry: ContentRegistry::new(),
            tracker,
            content_hashes: ContentHashRegistry::new(),
            provenance: ProvenanceStore::new(),
            generated: GeneratedPageCache::new(),
            snapshot: ArcSwapOption::empty(),
        }
    }

    fn cache_dir(&self) -> PathBuf {
        self.root.join(&self.config.cache.dir)
    }

    /// Phase 1: seed tracker and URL ownership from the persisted cache.
    ///
    /// With `force` set the cache is ignored outright; every page will carry
    /// a FORCED manifest entry.
    pub fn load_cache(&mut self) -> Result<()> {
        if self.config.incremental.force {
            log!("cache"; "force build, ignoring persisted cache");
            return Ok(());
        }

        let data = cache::load_cache_from(&self.cache_dir());
        self.registry
            .ownership_mut()
            .context("cache must load before the registry is frozen")?
            .load_persisted(data.claims);
        self.tracker.load_persisted(data.tracker);
        Ok(())
    }

    /// Phase 3: freeze the registry, build and publish the snapshot.
    ///
    /// Acts as the barrier between discovery and rendering: no worker can
    /// observe a half-built snapshot because publication is a single
    /// pointer swap.
    pub fn seal(&mut self, loader: &impl TemplateLoader) -> Result<Arc<SiteSnapshot>> {
        self.registry.freeze();
        let snapshot = SnapshotBuilder::new(&self.registry, loader)
            .with_max_depth(self.config.templates.max_depth)
            .build()?;
        let snapshot = Arc::new(snapshot);
        self.snapshot.store(Some(Arc::clone(&snapshot)));
        Ok(snapshot)
    }

    /// The published snapshot for the current generation, if sealed.
    pub fn snapshot(&self) -> Option<Arc<SiteSnapshot>> {
        self.snapshot.load_full()
    }

    /// Phase 4: render every page that needs it, in parallel.
    ///
    /// Returns the manifest describing what was rebuilt and why. Page
    /// render failures are logged and recorded; they do not abort the
    /// remaining pages.
    pub fn render<R: PageRenderer>(&self, renderer: &R) -> Result<RebuildManifest> {
        let snapshot = self
            .snapshot()
            .context("render called before seal - no snapshot published")?;

        let mut manifest = RebuildManifest::new(
            new_build_id(snapshot.epoch()),
            self.config.incremental.enabled && !self.config.incremental.force,
        );

        // Template impact is resolved once up front: one is_changed check
        // per template, then a map lookup per changed one.
        let template_affected = self.template_affected_sources(&snapshot, &mut manifest);

        let progress = ProgressLine::new(&[("rendered", snapshot.page_count())]);
        let outcomes: Vec<PageOutcome> = snapshot
            .pages()
            .par_iter()
            .map(|page| {
                // A dev-server rebuild may have superseded this generation;
                // finish nothing new for it.
                if self.registry.epoch() != snapshot.epoch() {
                    return PageOutcome::Superseded;
                }
                let outcome = self.process_page(page, &snapshot, renderer, &template_affected);
                if matches!(outcome, PageOutcome::Rebuilt { .. }) {
                    progress.inc("rendered");
                }
                outcome
            })
            .collect();
        progress.finish();

        let mut failed = 0usize;
        let mut superseded = false;
        for outcome in outcomes {
            match outcome {
                PageOutcome::Rebuilt {
                    source,
                    reason,
                    trigger,
                    duration_ms,
                } => manifest.record_rebuild(&source, reason, trigger, duration_ms),
                PageOutcome::CacheHit { source } => manifest.record_cache_hit(&source, 0.0),
                PageOutcome::Failed { source, error } => {
                    log!("error"; "render failed for {}: {}", source.display(), error);
                    failed += 1;
                }
                PageOutcome::Superseded => superseded = true,
            }
        }

        if superseded {
            log!("build"; "generation {} superseded, results discarded", snapshot.epoch());
        }
        if failed > 0 {
            log!("error"; "{} page(s) failed to render", failed);
        }

        // Advance template fingerprints with the pass, so an examined
        // template reads as unchanged next build instead of invalidating
        // its dependents forever. Only when the pass completed: failed or
        // superseded pages must stay invalidated.
        if !superseded && failed == 0 {
            let graph = snapshot.template_graph();
            for path in graph.names().filter_map(|name| graph.path_of(name)) {
                if let Some(fingerprint) = Fingerprint::capture(path) {
                    self.tracker.queue_fingerprint(path, fingerprint);
                }
            }
        }

        let summary = manifest.summary();
        debug!("build"; "{} rebuilt, {} cache hits, {} failed",
            summary.total_rebuilt, summary.total_cache_hits, failed);

        Ok(manifest)
    }

    /// Phase 5: fold worker fingerprints in and persist the cache.
    pub fn persist(&mut self) -> Result<()> {
        self.tracker.drain_pending();
        let data = BuildCacheData::new(
            self.registry.ownership().to_persisted(),
            self.tracker.to_persisted(),
        );
        cache::save_cache_to(&self.cache_dir(), &data)?;
        Ok(())
    }

    /// Start a new build generation (dev-server rebuild): retract the
    /// published snapshot, unfreeze and clear the registry (bumps the
    /// epoch) and drop per-generation caches. The tracker survives - its
    /// fingerprints are what make the next build incremental.
    pub fn start_new_generation(&mut self) -> Result<()> {
        self.snapshot.store(None);
        self.registry.unfreeze();
        self.registry.clear()?;
        self.generated.clear();
        self.content_hashes.clear();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rebuild decisions
    // ------------------------------------------------------------------

    /// Sources of pages hit by template changes, plus manifest notes for
    /// each changed template.
    fn template_affected_sources(
        &self,
        snapshot: &SiteSnapshot,
        manifest: &mut RebuildManifest,
    ) -> FxHashSet<PathBuf> {
        let mut affected = FxHashSet::default();
        let graph = snapshot.template_graph();

        let changed_paths: Vec<PathBuf> = graph
            .names()
            .filter_map(|name| graph.path_of(name))
            .filter(|path| self.tracker.is_changed(path))
            .cloned()
            .collect();

        for path in changed_paths {
            let pages = snapshot.pages_affected_by_template_change(&path);
            if !pages.is_empty() {
                manifest.note_invalidation(
                    path.display().to_string(),
                    json!({ "pages": pages.len() }),
                );
            }
            affected.extend(pages.into_iter().map(|p| p.source.clone()));
        }
        affected
    }

    fn process_page<R: PageRenderer>(
        &self,
        page: &Arc<PageSnapshot>,
        snapshot: &SiteSnapshot,
        renderer: &R,
        template_affected: &FxHashSet<PathBuf>,
    ) -> PageOutcome {
        let Some((reason, trigger)) = self.rebuild_reason(page, template_affected) else {
            return PageOutcome::CacheHit {
                source: page.source.clone(),
            };
        };

        let start = Instant::now();
        match renderer.render(page, snapshot) {
            Ok(()) => {
                if let Some(fingerprint) = Fingerprint::capture(&page.source) {
                    self.tracker.queue_fingerprint(&page.source, fingerprint);
                }
                self.provenance
                    .record(page.url.clone(), &page.source, "content", snapshot.epoch());
                PageOutcome::Rebuilt {
                    source: page.source.clone(),
                    reason,
                    trigger,
                    duration_ms: start.elapsed().as_secs_f64() * 1000.0,
                }
            }
            Err(e) => PageOutcome::Failed {
                source: page.source.clone(),
                error: format!("{e:#}"),
            },
        }
    }

    /// Why a page must rebuild, or `None` for a cache hit. Checks are
    /// ordered cheapest-first; the first hit wins.
    fn rebuild_reason(
        &self,
        page: &PageSnapshot,
        template_affected: &FxHashSet<PathBuf>,
    ) -> Option<(RebuildReason, &'static str)> {
        if self.config.incremental.force {
            return Some((RebuildReason::Forced, "forced"));
        }
        if !self.config.incremental.enabled {
            return Some((RebuildReason::Forced, "incremental_disabled"));
        }
        if self.tracker.fingerprint(&page.source).is_none() {
            return Some((RebuildReason::CacheMiss, "initial_build"));
        }
        if self.tracker.is_changed(&page.source) {
            return Some((RebuildReason::ContentChanged, "file_modified"));
        }
        if template_affected.contains(&page.source) {
            return Some((RebuildReason::TemplateChanged, "template_modified"));
        }
        if let Some(deps) = self.tracker.dependencies_of(&page.source) {
            for dep in deps {
                if self.tracker.is_changed(dep) {
                    let reason = if is_data_file(dep) {
                        RebuildReason::DataFileChanged
                    } else {
                        RebuildReason::DependencyChanged
                    };
                    return Some((reason, "dependency_modified"));
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn registry(&self) -> &ContentRegistry {
        &self.registry
    }

    /// Mutable registry access for the discovery phase.
    pub fn registry_mut(&mut self) -> &mut ContentRegistry {
        &mut self.registry
    }

    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    /// Mutable tracker access for single-threaded phases (discovery records
    /// dependencies here).
    pub fn tracker_mut(&mut self) -> &mut DependencyTracker {
        &mut self.tracker
    }

    pub fn content_hashes(&self) -> &ContentHashRegistry {
        &self.content_hashes
    }

    pub fn provenance(&self) -> &ProvenanceStore {
        &self.provenance
    }

    pub fn generated_pages(&self) -> &GeneratedPageCache {
        &self.generated
    }
}

fn is_data_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| DATA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn new_build_id(epoch: u64) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("build-{epoch}-{millis}")
}
