//! Shared helpers for library integration tests.

use std::path::{Path, PathBuf};

use filetime::FileTime;
use tempfile::TempDir;

/// A scratch project tree.
pub struct TestTree {
  pub temp: TempDir,
}

impl TestTree {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.root().join(relative)
  }

  /// Write a file relative to the tree, creating parent directories.
  pub fn write(&self, relative: &str, content: &str) {
    let path = self.path(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read(&self, relative: &str) -> String {
    std::fs::read_to_string(self.path(relative)).unwrap_or_else(|e| panic!("failed to read {relative}: {e}"))
  }

  /// Pin the modification time of a file to `secs` after the epoch.
  pub fn touch(&self, relative: &str, secs: i64) {
    filetime::set_file_mtime(self.path(relative), FileTime::from_unix_time(secs, 0)).unwrap();
  }
}
