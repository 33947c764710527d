//! Incremental, dependency-aware file processing.
//!
//! This module provides:
//! - [`graph`]: a run-scoped registry of files and their resolved dependencies
//! - [`staleness`]: effective modification times and the freshness rule
//! - [`pipeline`]: the orchestrator that regenerates stale outputs
//!
//! All filesystem probing goes through a [`SourceProbe`], which production
//! code satisfies with [`FileAccess`] so every stat runs as the invoking
//! identity.

pub mod graph;
pub mod pipeline;
pub mod staleness;
pub mod types;

use std::path::Path;
use std::time::SystemTime;

use crate::access::FileAccess;

pub use graph::{FileNode, NodeId, NodeRegistry, SearchPath};
pub use pipeline::{PipelineOptions, PipelineOutcome, Transform, TransformError, check_dependencies, remove_orphans};
pub use staleness::is_stale;
pub use types::{GraphError, PipelineError};

/// Filesystem queries needed to resolve and date source files.
pub trait SourceProbe {
  /// Whether `path` names an existing regular file.
  fn is_file(&self, path: &Path) -> Result<bool, GraphError>;

  /// Modification time of `path`, `None` when it does not exist.
  fn modified(&self, path: &Path) -> Result<Option<SystemTime>, GraphError>;
}

impl SourceProbe for FileAccess {
  fn is_file(&self, path: &Path) -> Result<bool, GraphError> {
    Ok(FileAccess::is_file(self, path)?)
  }

  fn modified(&self, path: &Path) -> Result<Option<SystemTime>, GraphError> {
    Ok(FileAccess::modified(self, path)?)
  }
}
