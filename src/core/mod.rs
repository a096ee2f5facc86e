//! Core value types shared across the build engine.

mod path;
mod priority;
mod url;

pub use path::{canonical_source_path, normalize_path};
pub use priority::ClaimPriority;
pub use url::UrlPath;
