//! Content entry types stored in the registry.
//!
//! Plain data structs: page/section behavior lives in free functions and
//! trait impls on the snapshot side, not in a class hierarchy.

use std::path::PathBuf;

use serde::Serialize;

use crate::core::UrlPath;

/// Arbitrary front-matter passthrough (user-defined keys preserved in order).
pub type MetaMap = serde_json::Map<String, serde_json::Value>;

/// A single content page discovered on disk.
#[derive(Debug, Clone, Serialize)]
pub struct PageEntry {
    /// Canonical source path.
    pub source: PathBuf,
    /// Output URL (canonical at registration time).
    pub url: UrlPath,
    /// Page title from front matter, if any.
    pub title: Option<String>,
    /// Template name the page renders with, if it names one.
    pub template: Option<String>,
    /// Remaining front-matter fields.
    #[serde(default)]
    pub meta: MetaMap,
}

impl PageEntry {
    pub fn new(source: impl Into<PathBuf>, url: UrlPath) -> Self {
        Self {
            source: source.into(),
            url,
            title: None,
            template: None,
            meta: MetaMap::new(),
        }
    }

    /// Builder-style title setter.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Builder-style template setter.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Builder-style meta setter.
    pub fn with_meta(mut self, meta: MetaMap) -> Self {
        self.meta = meta;
        self
    }

    /// Get title, falling back to the URL if not set.
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_else(|| self.url.as_str())
    }
}

/// A content section (directory with an index file).
#[derive(Debug, Clone, Serialize)]
pub struct SectionEntry {
    /// Canonical source path of the section index file.
    pub source: PathBuf,
    /// Section URL.
    pub url: UrlPath,
    /// Section title, if any.
    pub title: Option<String>,
    /// Template name for section listing pages.
    pub template: Option<String>,
    /// Metadata cascaded onto descendant pages (merged root-to-leaf at
    /// snapshot time, nearer sections winning).
    #[serde(default)]
    pub cascade: MetaMap,
}

impl SectionEntry {
    pub fn new(source: impl Into<PathBuf>, url: UrlPath) -> Self {
        Self {
            source: source.into(),
            url,
            title: None,
            template: None,
            cascade: MetaMap::new(),
        }
    }

    /// Builder-style title setter.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Builder-style cascade setter.
    pub fn with_cascade(mut self, cascade: MetaMap) -> Self {
        self.cascade = cascade;
        self
    }
}
