//! Shared utilities.
//!
//! Path helpers used across tasks, plus test helpers.

use std::path::{Component, Path, PathBuf};

#[cfg(test)]
pub mod testutil;

/// Join `path` onto `base` unless it is already absolute.
pub fn resolve_under(base: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    base.join(path)
  }
}

/// Whether `path` stays below the directory it is joined to.
///
/// Rejects absolute paths and any `..` component.
pub fn is_contained(path: &Path) -> bool {
  path
    .components()
    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
