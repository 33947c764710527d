//! The incremental file pipeline.
//!
//! [`check_dependencies`] walks a source tree, registers every candidate,
//! resolves each candidate's dependencies into one shared registry, and
//! calls the transform's update for every output older than its source's
//! effective modification time.
//! The set of every output path it computed is returned so the caller can
//! delete artifacts that no source produces any more, see
//! [`remove_orphans`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::access::FileAccess;
use crate::executor::ExecutorError;

use super::graph::{NodeRegistry, SearchPath};
use super::staleness::is_stale;
use super::types::{GraphError, PipelineError};

/// Error type transforms may return from their callbacks.
pub type TransformError = Box<dyn std::error::Error + Send + Sync>;

/// The four callbacks that specialise the pipeline for one kind of file.
pub trait Transform {
  /// Whether a file found while crawling should be processed.
  fn is_candidate(&self, full_path: &Path) -> bool;

  /// Dependency identifiers referenced by a file. Defaults to none.
  fn dependencies(&self, _access: &FileAccess, _full_path: &Path) -> Result<Vec<String>, TransformError> {
    Ok(Vec::new())
  }

  /// Full output path for a candidate's relative path.
  fn output_path(&self, relative_path: &Path) -> PathBuf;

  /// Regenerate `output` from `source`.
  fn update(&self, access: &FileAccess, source: &Path, output: &Path) -> Result<(), TransformError>;
}

/// Inputs of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
  /// Directory candidates are relative to.
  pub base_dir: PathBuf,

  /// Where dependency identifiers are looked up.
  pub search: SearchPath,

  /// Explicit relative candidate paths. When set, no crawling or
  /// candidate filtering happens.
  pub files: Option<Vec<PathBuf>>,
}

impl PipelineOptions {
  pub fn new(base_dir: impl Into<PathBuf>) -> Self {
    Self {
      base_dir: base_dir.into(),
      ..Self::default()
    }
  }

  pub fn include_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
    self.search.include_dirs = dirs;
    self
  }

  pub fn local_include(mut self, enabled: bool) -> Self {
    self.search.local_include = enabled;
    self
  }

  pub fn files(mut self, files: Vec<PathBuf>) -> Self {
    self.files = Some(files);
    self
  }
}

/// Result of a complete pipeline run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
  /// Every output path computed, stale or not.
  pub outputs: BTreeSet<PathBuf>,

  /// Outputs that were regenerated, in processing order.
  pub updated: Vec<PathBuf>,
}

/// Regenerate every stale output of a source tree.
///
/// Each candidate is handled in a fixed order: resolve dependencies, compute
/// the effective modification time, map to an output, compare, update.
///
/// # Errors
///
/// Any error aborts the run; no partial outcome is returned.
pub fn check_dependencies<T>(
  access: &FileAccess,
  options: &PipelineOptions,
  transform: &T,
) -> Result<PipelineOutcome, PipelineError>
where
  T: Transform + ?Sized,
{
  let base_dir = &options.base_dir;
  let candidates = match &options.files {
    Some(files) => files.clone(),
    None => access
      .list_files(base_dir)?
      .into_iter()
      .filter(|relative| transform.is_candidate(&base_dir.join(relative)))
      .collect(),
  };

  info!(base = %base_dir.display(), candidates = candidates.len(), "checking dependencies");

  let mut registry = NodeRegistry::new();
  let mut extract = |path: &Path| {
    transform
      .dependencies(access, path)
      .map_err(|e| GraphError::Extract {
        path: path.to_path_buf(),
        message: e.to_string(),
      })
  };
  let mut outcome = PipelineOutcome::default();

  for relative in &candidates {
    registry.register(&relative.to_string_lossy(), &base_dir.join(relative));
  }

  for relative in candidates {
    let source = base_dir.join(&relative);
    let key = relative.to_string_lossy();

    let id = registry.get_or_resolve(&key, &source, &options.search, &mut extract, access)?;
    let effective = registry.effective_mod_time(id, access)?;
    let output = transform.output_path(&relative);
    let output_time = access.output_modified(&output)?;

    if is_stale(effective, output_time) {
      info!(source = %source.display(), output = %output.display(), "regenerating");
      transform
        .update(access, &source, &output)
        .map_err(|e| PipelineError::Update {
          source_path: source.clone(),
          output: output.clone(),
          message: e.to_string(),
        })?;
      outcome.updated.push(output.clone());
    } else {
      debug!(output = %output.display(), "up to date");
    }

    outcome.outputs.insert(output);
  }

  info!(
    outputs = outcome.outputs.len(),
    updated = outcome.updated.len(),
    files = registry.len(),
    "dependency check complete"
  );

  Ok(outcome)
}

/// Delete every file under `output_dir` that is not in `outputs`.
///
/// Runs as the target identity. Returns the removed paths.
pub fn remove_orphans(
  access: &FileAccess,
  output_dir: &Path,
  outputs: &BTreeSet<PathBuf>,
) -> Result<Vec<PathBuf>, ExecutorError> {
  let mut removed = Vec::new();
  for relative in access.list_output_files(output_dir)? {
    let full = output_dir.join(relative);
    if outputs.contains(&full) {
      continue;
    }
    access.remove_file(&full)?;
    removed.push(full);
  }
  if !removed.is_empty() {
    info!(dir = %output_dir.display(), count = removed.len(), "removed stale outputs");
  }
  Ok(removed)
}
