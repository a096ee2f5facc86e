//! Canonical source path handling.
//!
//! The registry keys pages by canonical source path: component-normalized,
//! symlink-resolved when the file exists on disk, and case-folded on
//! platforms with case-insensitive filesystems. Lookups try the exact path
//! first and fall back to the canonical form, so callers may pass paths in
//! whatever shape the file walker or editor produced.

use std::path::{Component, Path, PathBuf};

/// Normalize a path without touching the filesystem.
///
/// Resolves `.` and `..` components lexically. `..` at the root is dropped.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    // Leading `..` with nothing to pop: keep path relative
                    normalized.push(Component::ParentDir);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Compute the canonical form of a source path.
///
/// - Symlinks are resolved when the file exists (`fs::canonicalize`)
/// - Otherwise the path is normalized lexically
/// - On case-insensitive platforms (macOS, Windows) the textual form is
///   case-folded so `Content/About.md` and `content/about.md` collide
pub fn canonical_source_path(path: &Path) -> PathBuf {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| normalize_path(path));
    fold_case(resolved)
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn fold_case(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(s.to_lowercase()),
        None => path,
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn fold_case(path: PathBuf) -> PathBuf {
    path
}
