//! Test utilities for wdeploy-lib.
//!
//! In-memory probes for graph tests, plus helpers to build source trees
//! with pinned timestamps and stand-in external tools.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use filetime::FileTime;

use crate::deps::{GraphError, SourceProbe};

/// A timestamp `secs` seconds after the epoch.
pub fn at(secs: u64) -> SystemTime {
  UNIX_EPOCH + Duration::from_secs(secs)
}

/// Write a file, creating its parent directories.
pub fn write_file(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
}

/// Pin a file's modification time to `secs` after the epoch.
pub fn set_mtime(path: &Path, secs: i64) {
  filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

/// Install an executable shell script named `name` in `dir`.
pub fn fake_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  write_file(&path, &format!("#!/bin/sh\n{script}\n"));
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// A [`SourceProbe`] over a fixed set of files, counting stat calls.
#[derive(Debug, Default)]
pub struct MemoryProbe {
  files: RefCell<BTreeMap<PathBuf, SystemTime>>,
  stats: RefCell<BTreeMap<PathBuf, usize>>,
}

impl MemoryProbe {
  pub fn with_files(paths: &[&str]) -> Self {
    Self::with_times(&paths.iter().map(|p| (*p, 0)).collect::<Vec<_>>())
  }

  pub fn with_times(entries: &[(&str, u64)]) -> Self {
    Self {
      files: RefCell::new(entries.iter().map(|(p, t)| (PathBuf::from(p), at(*t))).collect()),
      stats: RefCell::default(),
    }
  }

  pub fn set_time(&self, path: &str, secs: u64) {
    self.files.borrow_mut().insert(PathBuf::from(path), at(secs));
  }

  pub fn remove(&self, path: &str) {
    self.files.borrow_mut().remove(Path::new(path));
  }

  pub fn stat_count(&self, path: &str) -> usize {
    self.stats.borrow().get(Path::new(path)).copied().unwrap_or(0)
  }
}

impl SourceProbe for MemoryProbe {
  fn is_file(&self, path: &Path) -> Result<bool, GraphError> {
    Ok(self.files.borrow().contains_key(path))
  }

  fn modified(&self, path: &Path) -> Result<Option<SystemTime>, GraphError> {
    *self.stats.borrow_mut().entry(path.to_path_buf()).or_default() += 1;
    Ok(self.files.borrow().get(path).copied())
  }
}
