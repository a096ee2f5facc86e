//! End-to-end build flow: discovery, claims, snapshot, render, manifest,
//! cache persistence and reload.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use tempfile::TempDir;

use cinder_core::core::ClaimPriority;
use cinder_core::registry::PageEntry;
use cinder_core::snapshot::{PageSnapshot, TemplateLoader};
use cinder_core::{
    BuildConfig, BuildContext, ClaimOutcome, PageRenderer, RebuildReason, SiteSnapshot, UrlPath,
};

struct DiskLoader {
    templates_dir: PathBuf,
}

impl TemplateLoader for DiskLoader {
    fn source(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.templates_dir.join(name)).ok()
    }
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let path = self.templates_dir.join(name);
        path.exists().then_some(path)
    }
}

struct CountingRenderer(AtomicUsize);

impl CountingRenderer {
    fn new() -> Self {
        Self(AtomicUsize::new(0))
    }
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl PageRenderer for CountingRenderer {
    fn render(&self, _page: &PageSnapshot, _snapshot: &SiteSnapshot) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Site {
    dir: TempDir,
}

impl Site {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("content")).unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn write_content(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root().join("content").join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn write_template(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root().join("templates").join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn loader(&self) -> DiskLoader {
        DiskLoader {
            templates_dir: self.root().join("templates"),
        }
    }
}

/// Discovery for a fixed set of pages: register, claim at content priority.
fn discover(context: &mut BuildContext, pages: &[(PathBuf, &str, Option<&str>)]) {
    for (source, url, template) in pages {
        let mut entry = PageEntry::new(source, UrlPath::from_page(url));
        if let Some(template) = template {
            entry = entry.with_template(*template);
        }
        context.registry_mut().register_page(entry).unwrap();
        context
            .registry_mut()
            .claim_url(
                UrlPath::from_page(url),
                "content",
                source,
                ClaimPriority::Content,
            )
            .unwrap();
    }
}

#[test]
fn content_claim_beats_generated_claim() {
    let site = Site::new();
    let about = site.write_content("about.md", "# About");

    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();
    discover(&mut context, &[(about.clone(), "/about/", None)]);

    // A taxonomy generator tries the same URL at generated priority and
    // must lose without an error.
    let outcome = context
        .registry_mut()
        .claim_url(
            UrlPath::from_page("/about/"),
            "taxonomy",
            "taxonomy:about",
            ClaimPriority::Generated,
        )
        .unwrap();
    assert_eq!(outcome, ClaimOutcome::Lost);

    let claim = context
        .registry()
        .ownership()
        .get_claim(&UrlPath::from_page("/about/"))
        .unwrap();
    assert_eq!(claim.owner, "content");
    assert_eq!(claim.source, about);
}

#[test]
fn full_cycle_second_build_hits_cache() {
    let site = Site::new();
    let a = site.write_content("a.md", "# A");
    let b = site.write_content("b.md", "# B");
    let pages = [(a, "/a/", None), (b, "/b/", None)];

    // Build 1: everything is a cache miss.
    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();
    discover(&mut context, &pages);
    context.seal(&site.loader()).unwrap();

    let renderer = CountingRenderer::new();
    let manifest = context.render(&renderer).unwrap();
    assert_eq!(renderer.count(), 2);
    assert!(
        manifest
            .entries()
            .iter()
            .all(|e| e.reason == RebuildReason::CacheMiss)
    );
    context.persist().unwrap();

    // Build 2: nothing changed, nothing renders.
    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();
    discover(&mut context, &pages);
    context.seal(&site.loader()).unwrap();

    let renderer = CountingRenderer::new();
    let manifest = context.render(&renderer).unwrap();
    assert_eq!(renderer.count(), 0);
    let summary = manifest.summary();
    assert_eq!(summary.total_cache_hits, 2);
    assert_eq!(summary.total_rebuilt, 0);
}

#[test]
fn untouched_templates_do_not_invalidate_second_build() {
    let site = Site::new();
    site.write_template("base.html", "<html>{% block body %}{% endblock %}</html>");
    site.write_template("post.html", r#"{% extends "base.html" %}"#);
    let p = site.write_content("p.md", "# P");
    let pages = [(p, "/p/", Some("post.html"))];

    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();
    discover(&mut context, &pages);
    context.seal(&site.loader()).unwrap();
    context.render(&CountingRenderer::new()).unwrap();
    context.persist().unwrap();

    // Build 2, nothing touched on disk: the templates the first build
    // examined must read as unchanged, not rebuild their pages forever.
    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();
    discover(&mut context, &pages);
    context.seal(&site.loader()).unwrap();

    let renderer = CountingRenderer::new();
    let manifest = context.render(&renderer).unwrap();
    assert_eq!(renderer.count(), 0);
    let summary = manifest.summary();
    assert_eq!(summary.total_cache_hits, 1);
    assert_eq!(summary.total_rebuilt, 0);
}

#[test]
fn template_change_rebuilds_only_dependent_pages() {
    let site = Site::new();
    site.write_template("base.html", "<html>{% block body %}{% endblock %}</html>");
    site.write_template("post.html", r#"{% extends "base.html" %}"#);
    site.write_template("plain.html", "<div></div>");

    let p1 = site.write_content("p1.md", "# P1");
    let p2 = site.write_content("p2.md", "# P2");
    let p3 = site.write_content("p3.md", "# P3");
    let pages = [
        (p1, "/p1/", Some("post.html")),
        (p2, "/p2/", Some("post.html")),
        (p3, "/p3/", Some("plain.html")),
    ];

    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();
    discover(&mut context, &pages);
    context.seal(&site.loader()).unwrap();
    context.render(&CountingRenderer::new()).unwrap();
    context.persist().unwrap();

    // Touch the base template; only its transitive users must rebuild.
    site.write_template(
        "base.html",
        "<html lang=\"en\">{% block body %}{% endblock %}</html>",
    );

    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();
    discover(&mut context, &pages);
    context.seal(&site.loader()).unwrap();

    let renderer = CountingRenderer::new();
    let manifest = context.render(&renderer).unwrap();
    assert_eq!(renderer.count(), 2);

    let mut rebuilt: Vec<&str> = manifest
        .entries()
        .iter()
        .filter(|e| !e.from_cache)
        .map(|e| e.page.as_str())
        .collect();
    rebuilt.sort();
    assert_eq!(rebuilt.len(), 2);
    assert!(rebuilt[0].ends_with("p1.md"));
    assert!(rebuilt[1].ends_with("p2.md"));
    assert!(
        manifest
            .entries()
            .iter()
            .filter(|e| !e.from_cache)
            .all(|e| e.reason == RebuildReason::TemplateChanged)
    );
}

#[test]
fn corrupt_cache_degrades_to_full_rebuild() {
    let site = Site::new();
    let a = site.write_content("a.md", "# A");
    let pages = [(a, "/a/", None)];

    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();
    discover(&mut context, &pages);
    context.seal(&site.loader()).unwrap();
    context.render(&CountingRenderer::new()).unwrap();
    context.persist().unwrap();

    // Smash the cache file.
    let cache_file = site.root().join(".cinder/cache/build.json");
    fs::write(&cache_file, "{{{ definitely not json").unwrap();

    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();
    discover(&mut context, &pages);
    context.seal(&site.loader()).unwrap();

    let renderer = CountingRenderer::new();
    let manifest = context.render(&renderer).unwrap();
    // Full rebuild, zero cache hits, no error.
    assert_eq!(renderer.count(), 1);
    let summary = manifest.summary();
    assert_eq!(summary.total_cache_hits, 0);
    assert_eq!(summary.by_reason["CACHE_MISS"], 1);
}

#[test]
fn claims_persist_across_builds_as_advisory_seeds() {
    let site = Site::new();
    let a = site.write_content("a.md", "# A");

    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();
    // Taxonomy page generated at /guides/ this build.
    context
        .registry_mut()
        .claim_url(
            UrlPath::from_page("/guides/"),
            "taxonomy",
            "taxonomy:guides",
            ClaimPriority::Generated,
        )
        .unwrap();
    discover(&mut context, &[(a.clone(), "/a/", None)]);
    context.seal(&site.loader()).unwrap();
    context.render(&CountingRenderer::new()).unwrap();
    context.persist().unwrap();

    // Next build: user adds real content at /guides/. The seeded taxonomy
    // claim must silently give way.
    let guides = site.write_content("guides.md", "# Guides");
    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();

    let outcome = context
        .registry_mut()
        .claim_url(
            UrlPath::from_page("/guides/"),
            "content",
            &guides,
            ClaimPriority::Content,
        )
        .unwrap();
    assert!(outcome.won());
    assert_eq!(
        context
            .registry()
            .ownership()
            .get_claim(&UrlPath::from_page("/guides/"))
            .unwrap()
            .owner,
        "content"
    );
}

#[test]
fn manifest_json_is_stable_shape() {
    let site = Site::new();
    let a = site.write_content("a.md", "# A");

    let mut context = BuildContext::new(site.root(), BuildConfig::default());
    context.load_cache().unwrap();
    discover(&mut context, &[(a, "/a/", None)]);
    context.seal(&site.loader()).unwrap();
    let manifest = context.render(&CountingRenderer::new()).unwrap();

    let json = manifest.to_json();
    for key in [
        "build_id",
        "incremental",
        "rebuilt",
        "cache_hits",
        "skipped",
        "entries",
        "invalidation_summary",
    ] {
        assert!(json.get(key).is_some(), "missing manifest key {key}");
    }
    assert_eq!(json["rebuilt"], 1);
    assert_eq!(json["incremental"], true);
}
