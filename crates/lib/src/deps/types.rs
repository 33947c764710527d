//! Error types for dependency resolution and the file pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::executor::ExecutorError;

/// Errors raised while building the dependency graph or computing staleness.
#[derive(Debug, Error)]
pub enum GraphError {
  /// A dependency identifier matched no file in any search location.
  #[error("missing dependency: {dependency} (required by {from})")]
  MissingDependency { dependency: String, from: String },

  /// Attaching a dependency would close a cycle back to `file`.
  #[error("circular dependency: file {file} depends on itself through {through}")]
  CircularDependency { file: String, through: String },

  /// One relative path was claimed by two different files.
  #[error("{key} is registered for {registered}, not {requested}")]
  KeyConflict {
    key: String,
    registered: PathBuf,
    requested: PathBuf,
  },

  /// A registered source file no longer exists.
  #[error("source file vanished: {0}")]
  Vanished(PathBuf),

  /// The dependency extractor failed.
  #[error("failed to extract dependencies of {path}: {message}")]
  Extract { path: PathBuf, message: String },

  /// A filesystem probe failed in the privileged child.
  #[error(transparent)]
  Access(#[from] ExecutorError),
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Access(#[from] ExecutorError),

  /// The update callback failed for one candidate.
  #[error("failed to update {output} from {source_path}: {message}")]
  Update {
    source_path: PathBuf,
    output: PathBuf,
    message: String,
  },
}
