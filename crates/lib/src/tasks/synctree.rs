//! `synctree`: mirror a source directory below the prefix.
//!
//! A file is copied when the destination copy is missing or older than the
//! source. Files whose name matches an exclude pattern are never copied.
//! With `delete_stale`, destination files without a copied source
//! counterpart are removed and empty directories pruned afterwards.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::Deserialize;
use tracing::{debug, info};

use super::{DeployContext, TaskError, default_true, parse_args};
use crate::deps::is_stale;
use crate::executor::ExecutorError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SynctreeArgs {
  source: PathBuf,
  destination: PathBuf,
  #[serde(default = "default_true")]
  delete_stale: bool,
  #[serde(default = "default_exclude")]
  exclude: Vec<String>,
}

fn default_exclude() -> Vec<String> {
  vec!["*.pyc".to_string()]
}

/// Counts from one synchronisation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SyncStats {
  copied: usize,
  unchanged: usize,
  removed: usize,
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: SynctreeArgs = parse_args("synctree", args)?;
  let excludes = args
    .exclude
    .iter()
    .map(|p| Pattern::new(p).map_err(|e| TaskError::Failed(format!("invalid exclude pattern {p:?}: {e}"))))
    .collect::<Result<Vec<_>, _>>()?;

  let source = context.source_path(&args.source);
  let destination = context.destination_path(&args.destination);
  let stats = sync(context, &source, &destination, &excludes, args.delete_stale)?;

  info!(
    source = %source.display(),
    destination = %destination.display(),
    copied = stats.copied,
    unchanged = stats.unchanged,
    removed = stats.removed,
    "tree synchronised"
  );
  Ok(())
}

fn sync(
  context: &DeployContext,
  source: &Path,
  destination: &Path,
  excludes: &[Pattern],
  delete_stale: bool,
) -> Result<SyncStats, ExecutorError> {
  let access = &context.access;
  let mut stats = SyncStats::default();
  let mut mirrored = BTreeSet::new();

  access.create_dir_all(destination)?;

  for relative in access.list_files(source)? {
    if is_excluded(&relative, excludes) {
      debug!(path = %relative.display(), "excluded");
      continue;
    }

    let from = source.join(&relative);
    let to = destination.join(&relative);
    let source_time = access
      .modified(&from)?
      .ok_or_else(|| ExecutorError::Operation(format!("{} vanished during sync", from.display())))?;

    if is_stale(source_time, access.output_modified(&to)?) {
      access.copy(&from, &to)?;
      stats.copied += 1;
    } else {
      stats.unchanged += 1;
    }
    mirrored.insert(relative);
  }

  if delete_stale {
    for relative in access.list_output_files(destination)? {
      if !mirrored.contains(&relative) {
        access.remove_file(&destination.join(&relative))?;
        stats.removed += 1;
      }
    }
    access.prune_empty_dirs(destination)?;
  }

  Ok(stats)
}

fn is_excluded(relative: &Path, excludes: &[Pattern]) -> bool {
  let Some(name) = relative.file_name().and_then(|n| n.to_str()) else {
    return false;
  };
  excludes.iter().any(|pattern| pattern.matches(name))
}
