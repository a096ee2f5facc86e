//! Rebuild manifest - the structured record of what a build did and why.
//!
//! Pure output artifact: built fresh every build, append-only while the
//! build runs, never mutated after it completes, and nothing feeds back
//! from it into build decisions. Consumed by the CLI summary line and by
//! debugging tooling via [`RebuildManifest::to_json`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Why a page was rebuilt (or would have been).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebuildReason {
    /// The page's own source file changed.
    ContentChanged,
    /// A data file the page reads changed.
    DataFileChanged,
    /// A template in the page's transitive template set changed.
    TemplateChanged,
    /// Some other tracked input changed.
    DependencyChanged,
    /// No usable cache entry existed for the page.
    CacheMiss,
    /// Full rebuild forced (cache discarded, --force, config change).
    Forced,
    /// No input changed; the cached output was served as-is.
    Unchanged,
}

impl RebuildReason {
    /// Stable string form used in the manifest JSON.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContentChanged => "CONTENT_CHANGED",
            Self::DataFileChanged => "DATA_FILE_CHANGED",
            Self::TemplateChanged => "TEMPLATE_CHANGED",
            Self::DependencyChanged => "DEPENDENCY_CHANGED",
            Self::CacheMiss => "CACHE_MISS",
            Self::Forced => "FORCED",
            Self::Unchanged => "UNCHANGED",
        }
    }
}

impl std::fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One processed page: rebuilt, or served from cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildEntry {
    /// Page source path (project-relative).
    pub page: String,
    pub reason: RebuildReason,
    /// What set the rebuild off (e.g. "file_modified", "initial_build").
    pub trigger: String,
    pub duration_ms: f64,
    /// True if the page's output came from cache instead of a render.
    pub from_cache: bool,
}

/// Aggregate counts for CLI/observability use.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestSummary {
    pub total_rebuilt: usize,
    pub total_skipped: usize,
    pub total_cache_hits: usize,
    /// Reason string → count, over non-cache-hit entries.
    pub by_reason: Map<String, Value>,
    pub total_duration_ms: f64,
}

/// Append-only record of one build.
#[derive(Debug, Clone)]
pub struct RebuildManifest {
    build_id: String,
    incremental: bool,
    entries: Vec<RebuildEntry>,
    skipped: Vec<String>,
    invalidation_summary: Map<String, Value>,
}

impl RebuildManifest {
    pub fn new(build_id: impl Into<String>, incremental: bool) -> Self {
        Self {
            build_id: build_id.into(),
            incremental,
            entries: Vec::new(),
            skipped: Vec::new(),
            invalidation_summary: Map::new(),
        }
    }

    /// Append an entry for a rebuilt page.
    pub fn record_rebuild(
        &mut self,
        page: &Path,
        reason: RebuildReason,
        trigger: impl Into<String>,
        duration_ms: f64,
    ) {
        self.entries.push(RebuildEntry {
            page: page.display().to_string(),
            reason,
            trigger: trigger.into(),
            duration_ms,
            from_cache: false,
        });
    }

    /// Append an entry for a page served from cache.
    pub fn record_cache_hit(&mut self, page: &Path, duration_ms: f64) {
        self.entries.push(RebuildEntry {
            page: page.display().to_string(),
            reason: RebuildReason::Unchanged,
            trigger: "cache_hit".to_string(),
            duration_ms,
            from_cache: true,
        });
    }

    /// Append a page that required no processing at all.
    pub fn record_skip(&mut self, page: &Path) {
        self.skipped.push(page.display().to_string());
    }

    /// Note a free-form invalidation fact (e.g. which template invalidated
    /// how many pages).
    pub fn note_invalidation(&mut self, key: impl Into<String>, value: Value) {
        self.invalidation_summary.insert(key.into(), value);
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn is_incremental(&self) -> bool {
        self.incremental
    }

    pub fn entries(&self) -> &[RebuildEntry] {
        &self.entries
    }

    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    fn rebuilt_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.from_cache).count()
    }

    fn cache_hit_count(&self) -> usize {
        self.entries.iter().filter(|e| e.from_cache).count()
    }

    /// Stable JSON shape consumed by external tooling.
    pub fn to_json(&self) -> Value {
        json!({
            "build_id": self.build_id,
            "incremental": self.incremental,
            "rebuilt": self.rebuilt_count(),
            "cache_hits": self.cache_hit_count(),
            "skipped": self.skipped.len(),
            "entries": self.entries,
            "invalidation_summary": self.invalidation_summary,
        })
    }

    /// Aggregate counts for the CLI summary line.
    pub fn summary(&self) -> ManifestSummary {
        let mut by_reason: Map<String, Value> = Map::new();
        for entry in self.entries.iter().filter(|e| !e.from_cache) {
            let key = entry.reason.as_str().to_string();
            let count = by_reason.get(&key).and_then(Value::as_u64).unwrap_or(0);
            by_reason.insert(key, json!(count + 1));
        }

        ManifestSummary {
            total_rebuilt: self.rebuilt_count(),
            total_skipped: self.skipped.len(),
            total_cache_hits: self.cache_hit_count(),
            by_reason,
            total_duration_ms: self.entries.iter().map(|e| e.duration_ms).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_manifest() -> RebuildManifest {
        let mut manifest = RebuildManifest::new("build-42", true);
        manifest.record_rebuild(
            &PathBuf::from("content/about.md"),
            RebuildReason::ContentChanged,
            "file_modified",
            45.2,
        );
        manifest.record_rebuild(
            &PathBuf::from("content/posts/a.md"),
            RebuildReason::TemplateChanged,
            "file_modified",
            12.0,
        );
        manifest.record_rebuild(
            &PathBuf::from("content/posts/b.md"),
            RebuildReason::TemplateChanged,
            "file_modified",
            9.5,
        );
        manifest.record_cache_hit(&PathBuf::from("content/index.md"), 0.3);
        manifest.record_skip(&PathBuf::from("content/draft.md"));
        manifest
    }

    #[test]
    fn test_json_shape() {
        let json = sample_manifest().to_json();

        assert_eq!(json["build_id"], "build-42");
        assert_eq!(json["incremental"], true);
        assert_eq!(json["rebuilt"], 3);
        assert_eq!(json["cache_hits"], 1);
        assert_eq!(json["skipped"], 1);

        let entries = json["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0]["page"], "content/about.md");
        assert_eq!(entries[0]["reason"], "CONTENT_CHANGED");
        assert_eq!(entries[0]["trigger"], "file_modified");
        assert_eq!(entries[0]["duration_ms"], 45.2);
        assert_eq!(entries[0]["from_cache"], false);

        // Cache-hit entries must not claim a change reason
        assert_eq!(entries[3]["reason"], "UNCHANGED");
        assert_eq!(entries[3]["from_cache"], true);

        assert!(json["invalidation_summary"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let summary = sample_manifest().summary();
        assert_eq!(summary.total_rebuilt, 3);
        assert_eq!(summary.total_cache_hits, 1);
        assert_eq!(summary.total_skipped, 1);
        assert_eq!(summary.by_reason["CONTENT_CHANGED"], 1);
        assert_eq!(summary.by_reason["TEMPLATE_CHANGED"], 2);
        assert!((summary.total_duration_ms - 67.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalidation_summary() {
        let mut manifest = RebuildManifest::new("b", true);
        manifest.note_invalidation("templates/base.html", json!({"pages": 3}));
        let json = manifest.to_json();
        assert_eq!(json["invalidation_summary"]["templates/base.html"]["pages"], 3);
    }

    #[test]
    fn test_reason_serde_names() {
        let json = serde_json::to_string(&RebuildReason::DataFileChanged).unwrap();
        assert_eq!(json, "\"DATA_FILE_CHANGED\"");
        let back: RebuildReason = serde_json::from_str("\"TEMPLATE_CHANGED\"").unwrap();
        assert_eq!(back, RebuildReason::TemplateChanged);
    }
}
