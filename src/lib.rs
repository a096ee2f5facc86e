//! Incremental build core for the cinder static site generator.
//!
//! This crate owns the machinery that decides *what* to rebuild and *when*
//! shared state may be touched:
//!
//! - [`registry`]: path/URL-indexed content store with a freeze/unfreeze
//!   lifecycle separating single-threaded discovery from parallel rendering
//! - [`ownership`]: priority-ranked URL claim table arbitrating between
//!   user content, generated pages and redirects
//! - [`tracker`]: file fingerprints plus a bidirectional dependency graph
//!   driving cache invalidation
//! - [`snapshot`]: immutable site snapshot (pages, sections, cascaded
//!   metadata, template dependency graph) shared lock-free by render workers
//! - [`locks`]: tier-ordered lock wrappers for the few caches that stay
//!   mutable during rendering
//! - [`engine`]: the build context and phase orchestration tying it together
//!
//! Renderers, config discovery, asset processing and the dev server live in
//! sibling crates; they consume snapshots and cache decisions from here.

pub mod cache;
pub mod caches;
pub mod config;
pub mod core;
pub mod engine;
pub mod fingerprint;
pub mod locks;
pub mod logger;
pub mod manifest;
pub mod ownership;
pub mod registry;
pub mod snapshot;
pub mod tracker;

pub use crate::core::{ClaimPriority, UrlPath};
pub use config::BuildConfig;
pub use engine::{BuildContext, PageRenderer};
pub use manifest::{RebuildManifest, RebuildReason};
pub use ownership::{ClaimOutcome, CollisionError, UrlOwnership};
pub use registry::{ContentRegistry, RegistryError};
pub use snapshot::{SiteSnapshot, SnapshotBuilder, TemplateLoader};
pub use tracker::DependencyTracker;
