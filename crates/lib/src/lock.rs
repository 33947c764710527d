//! Per-project deployment lock.
//!
//! Two deployments of the same project must not interleave their writes, so
//! a run holds an exclusive `flock` on `<root>/.deploy/lock` for its whole
//! duration. The file carries JSON metadata about the holder so a blocked
//! run can say who it is waiting for.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rustix::fs::{FlockOperation, flock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{DATA_DIR, LOCK_FILENAME};

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub root: PathBuf,
}

#[derive(Debug, Error)]
pub enum DeployLockError {
  #[error(
    "deployment is locked by another process: {command} (PID {pid}, started {started_at})\n\
     If you're sure no wdeploy process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    command: String,
    pid: u32,
    started_at: String,
    lock_path: PathBuf,
  },

  #[error(
    "deployment is locked (could not read lock metadata)\n\
     If you're sure no wdeploy process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// An exclusive lock on a project, released on drop.
#[derive(Debug)]
pub struct DeployLock {
  file: File,
  lock_path: PathBuf,
}

impl DeployLock {
  /// Lock the project rooted at `root` without blocking.
  ///
  /// # Errors
  ///
  /// [`DeployLockError::Contention`] naming the holder when another run
  /// owns the lock.
  pub fn acquire(root: &Path, command: &str) -> Result<Self, DeployLockError> {
    let data_dir = root.join(DATA_DIR);
    let lock_path = data_dir.join(LOCK_FILENAME);

    std::fs::create_dir_all(&data_dir).map_err(|source| DeployLockError::CreateDir {
      path: data_dir.clone(),
      source,
    })?;

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(DeployLockError::OpenFile)?;

    if let Err(err) = flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive) {
      let err = io::Error::from_raw_os_error(err.raw_os_error());
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(contention_error(&lock_path));
      }
      return Err(DeployLockError::LockFailed(err));
    }

    write_metadata(&file, command, root)?;
    debug!(path = %lock_path.display(), "deployment lock acquired");

    Ok(Self { file, lock_path })
  }

  /// Read the metadata back through the held handle.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_metadata(file: &File, command: &str, root: &Path) -> Result<(), DeployLockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    command: command.to_string(),
    root: root.to_path_buf(),
  };

  file.set_len(0).map_err(DeployLockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata)
    .map_err(|e| DeployLockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(DeployLockError::WriteMetadata)
}

fn contention_error(lock_path: &Path) -> DeployLockError {
  let metadata = std::fs::read_to_string(lock_path)
    .ok()
    .and_then(|contents| serde_json::from_str::<LockMetadata>(&contents).ok());

  match metadata {
    Some(metadata) => DeployLockError::Contention {
      command: metadata.command,
      pid: metadata.pid,
      started_at: format!("Unix timestamp {}", metadata.started_at_unix),
      lock_path: lock_path.to_path_buf(),
    },
    None => DeployLockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    },
  }
}
