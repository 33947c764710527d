//! Filesystem accessors bound to identities.
//!
//! Sources are always read as the identity that invoked the deployment and
//! artifacts are always written as the deployment target identity, so
//! generated files end up owned by the right user. Every accessor goes
//! through [`run_as`]; nothing here touches the filesystem from the calling
//! process directly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use walkdir::WalkDir;

use crate::executor::{ExecutorError, run_as};
use crate::identity::Identity;

/// Identity-bound file operations for one deployment.
#[derive(Debug, Clone, Default)]
pub struct FileAccess {
  origin: Identity,
  target: Identity,
  permissions: Option<u32>,
}

impl FileAccess {
  /// Create accessors reading as `origin` and writing as `target`.
  ///
  /// `permissions` is applied to every directory created and file written
  /// on the target side.
  pub fn new(origin: Identity, target: Identity, permissions: Option<u32>) -> Self {
    Self {
      origin,
      target,
      permissions,
    }
  }

  /// Accessors that never change identity.
  pub fn unprivileged() -> Self {
    Self::default()
  }

  pub fn origin(&self) -> &Identity {
    &self.origin
  }

  pub fn target(&self) -> &Identity {
    &self.target
  }

  pub fn permissions(&self) -> Option<u32> {
    self.permissions
  }

  /// Run an arbitrary operation as the origin identity.
  pub fn as_origin<T, E, F>(&self, operation: F) -> Result<T, ExecutorError>
  where
    T: Serialize + DeserializeOwned,
    E: std::fmt::Display,
    F: FnOnce() -> Result<T, E>,
  {
    run_as(&self.origin, operation)
  }

  /// Run an arbitrary operation as the target identity.
  pub fn as_target<T, E, F>(&self, operation: F) -> Result<T, ExecutorError>
  where
    T: Serialize + DeserializeOwned,
    E: std::fmt::Display,
    F: FnOnce() -> Result<T, E>,
  {
    run_as(&self.target, operation)
  }

  // ============ Origin side ============

  pub fn read_to_string(&self, path: &Path) -> Result<String, ExecutorError> {
    self.as_origin(|| fs::read_to_string(path).map_err(|e| path_error("read", path, e)))
  }

  pub fn read(&self, path: &Path) -> Result<Vec<u8>, ExecutorError> {
    self.as_origin(|| fs::read(path).map_err(|e| path_error("read", path, e)))
  }

  /// Modification time of a source file, `None` when it does not exist.
  pub fn modified(&self, path: &Path) -> Result<Option<SystemTime>, ExecutorError> {
    self.as_origin(|| mod_time(path))
  }

  pub fn is_file(&self, path: &Path) -> Result<bool, ExecutorError> {
    self.as_origin(|| Ok::<_, io::Error>(path.is_file()))
  }

  /// List every file under `dir`, as paths relative to `dir`, sorted.
  ///
  /// # Errors
  ///
  /// Fails when `dir` does not exist or cannot be traversed.
  pub fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>, ExecutorError> {
    self.as_origin(|| {
      if !dir.is_dir() {
        return Err(format!("source directory {} does not exist", dir.display()));
      }
      walk_files(dir)
    })
  }

  // ============ Target side ============

  /// Modification time of an output file, `None` when it does not exist.
  pub fn output_modified(&self, path: &Path) -> Result<Option<SystemTime>, ExecutorError> {
    self.as_target(|| mod_time(path))
  }

  /// List every file under an output directory; empty when it does not exist.
  pub fn list_output_files(&self, dir: &Path) -> Result<Vec<PathBuf>, ExecutorError> {
    self.as_target(|| {
      if !dir.is_dir() {
        return Ok(Vec::new());
      }
      walk_files(dir)
    })
  }

  /// Write `contents` to `path`, creating parent directories as needed.
  pub fn write(&self, path: &Path, contents: &[u8]) -> Result<(), ExecutorError> {
    debug!(path = %path.display(), bytes = contents.len(), "writing output");
    let permissions = self.permissions;
    self.as_target(|| {
      if let Some(parent) = path.parent() {
        create_dirs(parent, permissions)?;
      }
      fs::write(path, contents).map_err(|e| path_error("write", path, e))?;
      apply_permissions(path, permissions)
    })
  }

  /// Create `path` and its missing parents.
  pub fn create_dir_all(&self, path: &Path) -> Result<(), ExecutorError> {
    let permissions = self.permissions;
    self.as_target(|| create_dirs(path, permissions))
  }

  /// Read `source` as the origin identity and write it to `destination`.
  pub fn copy(&self, source: &Path, destination: &Path) -> Result<(), ExecutorError> {
    let contents = self.read(source)?;
    self.write(destination, &contents)
  }

  pub fn remove_file(&self, path: &Path) -> Result<(), ExecutorError> {
    debug!(path = %path.display(), "removing output");
    self.as_target(|| fs::remove_file(path).map_err(|e| path_error("remove", path, e)))
  }

  /// Remove every empty directory below `dir`, deepest first. `dir` itself stays.
  pub fn prune_empty_dirs(&self, dir: &Path) -> Result<usize, ExecutorError> {
    self.as_target(|| {
      let mut removed = 0usize;
      if !dir.is_dir() {
        return Ok(removed);
      }
      for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|e| format!("failed to traverse {}: {e}", dir.display()))?;
        if !entry.file_type().is_dir() {
          continue;
        }
        let empty = fs::read_dir(entry.path())
          .map(|mut it| it.next().is_none())
          .map_err(|e| path_error("read", entry.path(), e))?;
        if empty {
          fs::remove_dir(entry.path()).map_err(|e| path_error("remove", entry.path(), e))?;
          removed += 1;
        }
      }
      Ok::<_, String>(removed)
    })
  }
}

fn path_error(action: &str, path: &Path, error: io::Error) -> String {
  format!("failed to {action} {}: {error}", path.display())
}

fn mod_time(path: &Path) -> Result<Option<SystemTime>, String> {
  match fs::metadata(path) {
    Ok(metadata) => metadata.modified().map(Some).map_err(|e| path_error("stat", path, e)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(path_error("stat", path, e)),
  }
}

fn walk_files(dir: &Path) -> Result<Vec<PathBuf>, String> {
  let mut files = Vec::new();
  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(|e| format!("failed to traverse {}: {e}", dir.display()))?;
    let is_file = entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file());
    if !is_file {
      continue;
    }
    if let Ok(relative) = entry.path().strip_prefix(dir) {
      files.push(relative.to_path_buf());
    }
  }
  Ok(files)
}

fn create_dirs(path: &Path, permissions: Option<u32>) -> Result<(), String> {
  if path.as_os_str().is_empty() || path.is_dir() {
    return Ok(());
  }

  // Remember which levels are new so the mask only lands on those.
  let mut missing = Vec::new();
  let mut current = Some(path);
  while let Some(dir) = current {
    if dir.as_os_str().is_empty() || dir.is_dir() {
      break;
    }
    missing.push(dir.to_path_buf());
    current = dir.parent();
  }

  fs::create_dir_all(path).map_err(|e| path_error("create", path, e))?;
  for dir in missing.iter().rev() {
    apply_permissions(dir, permissions)?;
  }
  Ok(())
}

fn apply_permissions(path: &Path, permissions: Option<u32>) -> Result<(), String> {
  use std::os::unix::fs::PermissionsExt;

  let Some(mode) = permissions else {
    return Ok(());
  };
  fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| path_error("chmod", path, e))
}
