//! Static template dependency analysis.
//!
//! Templates are parsed with regexes, not a full grammar: we only need the
//! `extends` / `include` / `import` statements to know which templates pull
//! in which. A template the loader cannot supply (third-party, missing,
//! non-UTF8) gets no analysis and is treated as depending on everything
//! that could matter, so a change to it always invalidates its users.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::debug;

/// Supplies template source text and name resolution.
///
/// Implemented by the template engine adapter; the graph never touches the
/// filesystem directly.
pub trait TemplateLoader {
    /// Static source text of a template, or `None` if it cannot be read.
    fn source(&self, name: &str) -> Option<String>;

    /// Resolve a template name to its on-disk path, if known.
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

// ============================================================================
// Statement extraction
// ============================================================================

// Explicit whitespace classes: `\s` needs the regex crate's unicode-perl
// feature, which this build leaves off.
static EXTENDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{%-?[ \t\r\n]*extends[ \t\r\n]+["']([^"']+)["']"#).unwrap());
static INCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{%-?[ \t\r\n]*include[ \t\r\n]+["']([^"']+)["']"#).unwrap());
static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{%-?[ \t\r\n]*import[ \t\r\n]+["']([^"']+)["']"#).unwrap());
static FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{%-?[ \t\r\n]*from[ \t\r\n]+["']([^"']+)["'][ \t\r\n]+import"#).unwrap()
});
static BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%-?[ \t\r\n]*block[ \t\r\n]+([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static MACRO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%-?[ \t\r\n]*macro[ \t\r\n]+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Static structure of one template.
#[derive(Debug, Clone, Default)]
pub struct TemplateAnalysis {
    /// Parent template, if the template extends one. At most one.
    pub extends: Option<String>,
    /// Templates pulled in via `include`, `import` or `from ... import`.
    pub includes: Vec<String>,
    /// Block names defined in this template.
    pub blocks: Vec<String>,
    /// Macro names defined in this template.
    pub macros: Vec<String>,
    /// Direct plus transitive dependencies (filled in by the graph build).
    pub all_dependencies: FxHashSet<String>,
}

impl TemplateAnalysis {
    /// Extract the static structure from template source text.
    pub fn parse(source: &str) -> Self {
        let extends = EXTENDS_RE
            .captures(source)
            .map(|c| c[1].to_string());

        let mut includes = Vec::new();
        for re in [&*INCLUDE_RE, &*IMPORT_RE, &*FROM_RE] {
            for cap in re.captures_iter(source) {
                let name = cap[1].to_string();
                if !includes.contains(&name) {
                    includes.push(name);
                }
            }
        }

        let blocks = BLOCK_RE
            .captures_iter(source)
            .map(|c| c[1].to_string())
            .collect();
        let macros = MACRO_RE
            .captures_iter(source)
            .map(|c| c[1].to_string())
            .collect();

        Self {
            extends,
            includes,
            blocks,
            macros,
            all_dependencies: FxHashSet::default(),
        }
    }

    /// Direct dependencies only (extends + includes).
    pub fn direct_dependencies(&self) -> impl Iterator<Item = &str> {
        self.extends
            .as_deref()
            .into_iter()
            .chain(self.includes.iter().map(String::as_str))
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Traversal bound guarding against cyclic extends/include chains.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Template name → who depends on whom, both directions.
///
/// Built once per snapshot from the set of templates pages actually
/// reference. Lookups after construction are map reads only.
#[derive(Debug, Default)]
pub struct TemplateGraph {
    /// Per-template analysis. `None` means the template could not be read
    /// or parsed and must be treated conservatively.
    analyses: FxHashMap<String, Option<TemplateAnalysis>>,
    /// Reverse index: template name → names of templates depending on it.
    dependency_graph: FxHashMap<String, FxHashSet<String>>,
    /// Template name → resolved source path, where the loader knows one.
    paths: FxHashMap<String, PathBuf>,
    max_depth: usize,
}

impl TemplateGraph {
    /// Analyze `roots` (the template names pages reference) and everything
    /// they transitively pull in.
    pub fn build<L: TemplateLoader>(
        loader: &L,
        roots: impl IntoIterator<Item = String>,
        max_depth: usize,
    ) -> Self {
        let mut graph = Self {
            max_depth,
            ..Self::default()
        };

        // Discover: analyze roots, then anything a root pulls in.
        let mut queue: Vec<String> = roots.into_iter().collect();
        while let Some(name) = queue.pop() {
            if graph.analyses.contains_key(&name) {
                continue;
            }
            let analysis = loader.source(&name).map(|src| TemplateAnalysis::parse(&src));
            if analysis.is_none() {
                debug!("snapshot"; "template '{}' unreadable, treating as always-dependent", name);
            }
            if let Some(path) = loader.resolve(&name) {
                graph.paths.insert(name.clone(), path);
            }
            if let Some(analysis) = &analysis {
                for dep in analysis.direct_dependencies() {
                    queue.push(dep.to_string());
                }
            }
            graph.analyses.insert(name, analysis);
        }

        // Close over dependencies, depth-bounded.
        let names: Vec<String> = graph.analyses.keys().cloned().collect();
        for name in &names {
            let closure = graph.transitive_dependencies(name);
            if let Some(Some(analysis)) = graph.analyses.get_mut(name) {
                analysis.all_dependencies = closure;
            }
        }

        // Reverse index from the closed forward sets: one map entry per
        // dependency, so dependent lookup never walks the analyses.
        for name in &names {
            let Some(Some(analysis)) = graph.analyses.get(name) else {
                continue;
            };
            let deps: Vec<String> = analysis.all_dependencies.iter().cloned().collect();
            for dep in deps {
                graph
                    .dependency_graph
                    .entry(dep)
                    .or_default()
                    .insert(name.clone());
            }
        }

        graph
    }

    fn transitive_dependencies(&self, name: &str) -> FxHashSet<String> {
        let mut seen = FxHashSet::default();
        let mut out = FxHashSet::default();
        self.walk_dependencies(name, 0, &mut seen, &mut out);
        out
    }

    fn walk_dependencies(
        &self,
        name: &str,
        depth: usize,
        seen: &mut FxHashSet<String>,
        out: &mut FxHashSet<String>,
    ) {
        if depth >= self.max_depth || !seen.insert(name.to_string()) {
            return;
        }
        let Some(Some(analysis)) = self.analyses.get(name) else {
            return;
        };
        for dep in analysis.direct_dependencies() {
            if dep != name {
                out.insert(dep.to_string());
            }
            self.walk_dependencies(dep, depth + 1, seen, out);
        }
    }

    /// Transitive dependents of a template: every analyzed template whose
    /// closed dependency set contains `name`. One reverse-map read.
    pub fn dependents_of(&self, name: &str) -> FxHashSet<String> {
        self.dependency_graph.get(name).cloned().unwrap_or_default()
    }

    /// Analysis for a template, if it parsed.
    pub fn analysis(&self, name: &str) -> Option<&TemplateAnalysis> {
        self.analyses.get(name).and_then(|a| a.as_ref())
    }

    /// Whether the graph has seen this template at all.
    pub fn contains(&self, name: &str) -> bool {
        self.analyses.contains_key(name)
    }

    /// Whether a template must be treated conservatively (seen, unparsed).
    pub fn is_conservative(&self, name: &str) -> bool {
        matches!(self.analyses.get(name), Some(None))
    }

    /// Resolved path for a template name.
    pub fn path_of(&self, name: &str) -> Option<&PathBuf> {
        self.paths.get(name)
    }

    /// Reverse lookup: template name whose resolved path matches.
    pub fn name_by_path(&self, path: &std::path::Path) -> Option<&str> {
        self.paths
            .iter()
            .find(|(_, p)| p.as_path() == path)
            .map(|(n, _)| n.as_str())
    }

    /// All template names the graph knows about.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.analyses.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }
}
