//! Provenance store: which source produced which output, and why.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::core::UrlPath;
use crate::locks::{Tier, TieredRwLock};

/// Where an output URL came from in this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Source file or generator identifier.
    pub source: PathBuf,
    /// Producer kind ("content", "taxonomy", ...).
    pub owner: String,
    /// Registry generation the output was produced under.
    pub epoch: u64,
}

/// Output URL → provenance, written by workers as they emit output.
///
/// Consulted during cleanup (which outputs are orphaned?) and when debugging
/// "who wrote this file". Tier 3: workers write while others read.
#[derive(Debug)]
pub struct ProvenanceStore {
    records: TieredRwLock<FxHashMap<UrlPath, Provenance>>,
}

impl ProvenanceStore {
    pub fn new() -> Self {
        Self {
            records: TieredRwLock::new(Tier::RenderCache, "provenance", FxHashMap::default()),
        }
    }

    /// Record that `source` produced the output at `url` in generation
    /// `epoch`. Last write wins.
    pub fn record(&self, url: UrlPath, source: impl Into<PathBuf>, owner: impl Into<String>, epoch: u64) {
        self.records.write().insert(
            url,
            Provenance {
                source: source.into(),
                owner: owner.into(),
                epoch,
            },
        );
    }

    /// Provenance for an output URL, if recorded this build.
    pub fn get(&self, url: &UrlPath) -> Option<Provenance> {
        self.records.read().get(url).cloned()
    }

    /// Whether the given source produced the output at `url`.
    pub fn produced_by(&self, url: &UrlPath, source: &Path) -> bool {
        self.records
            .read()
            .get(url)
            .is_some_and(|p| p.source == source)
    }

    /// URLs recorded under an epoch older than `current` (stale output from
    /// a superseded generation).
    pub fn stale_urls(&self, current: u64) -> Vec<UrlPath> {
        self.records
            .read()
            .iter()
            .filter(|(_, p)| p.epoch < current)
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn remove(&self, url: &UrlPath) {
        self.records.write().remove(url);
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for ProvenanceStore {
    fn default() -> Self {
        Self::new()
    }
}
