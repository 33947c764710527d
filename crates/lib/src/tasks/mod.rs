//! Deployment tasks.
//!
//! A configuration lists tasks by name; each name maps to a handler that
//! receives the shared [`DeployContext`] and the task's own argument table.
//! Handlers deserialize their arguments into a typed struct and do their
//! filesystem work through the context's identity-bound accessors.

mod a2site;
mod cgi;
mod css;
mod img;
mod js;
mod makefile;
mod makepages;
mod manage;
mod mkdir;
mod service;
mod symlink;
mod synctree;
mod virtualenv;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{info, warn};

use crate::access::FileAccess;
use crate::config::{Config, TaskSpec};
use crate::deps::{PipelineError, PipelineOptions, Transform, check_dependencies, remove_orphans};
use crate::executor::ExecutorError;
use crate::identity::{Identity, NameSource};
use crate::tools::{ToolError, ToolFinder};
use crate::util::resolve_under;

pub use css::CssTransform;
pub use img::ImageTransform;
pub use js::JsTransform;

#[derive(Debug, Error)]
pub enum TaskError {
  #[error("unknown task {0:?}")]
  UnknownTask(String),

  #[error("invalid arguments for task {task}: {source}")]
  InvalidArguments {
    task: String,
    #[source]
    source: toml::de::Error,
  },

  #[error(transparent)]
  Access(#[from] ExecutorError),

  #[error(transparent)]
  Pipeline(#[from] PipelineError),

  #[error(transparent)]
  Tool(#[from] ToolError),

  #[error("{0}")]
  Failed(String),
}

/// Signature every task handler has.
pub type TaskHandler = fn(&DeployContext, &toml::Table) -> Result<(), TaskError>;

/// Everything a task needs to run.
#[derive(Debug)]
pub struct DeployContext {
  pub config: Config,
  pub access: FileAccess,
  pub tools: ToolFinder,
}

impl DeployContext {
  /// Build the context for a loaded configuration.
  ///
  /// Sources are read as the user that invoked the deployment (through
  /// sudo when present) and outputs are written as the configured user and
  /// group.
  pub fn new(config: Config) -> Self {
    let target = Identity::new(
      config.user.clone().map(NameSource::from),
      config.group.clone().map(NameSource::from),
    );
    let access = FileAccess::new(Identity::invoking_user(), target, config.permissions);
    Self::with_access(config, access)
  }

  pub fn with_access(config: Config, access: FileAccess) -> Self {
    Self {
      config,
      access,
      tools: ToolFinder::new(),
    }
  }

  /// A source-side path, relative to the configured root.
  pub fn source_path(&self, path: impl AsRef<Path>) -> PathBuf {
    resolve_under(&self.config.root, path.as_ref())
  }

  /// A destination-side path, relative to the configured prefix.
  pub fn destination_path(&self, path: impl AsRef<Path>) -> PathBuf {
    resolve_under(&self.config.prefix, path.as_ref())
  }
}

/// Name to handler mapping.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
  handlers: BTreeMap<String, TaskHandler>,
}

impl TaskRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding every built-in task.
  pub fn builtin() -> Self {
    let mut registry = Self::new();
    registry.register("a2site", a2site::run);
    registry.register("cgi", cgi::run);
    registry.register("css", css::run);
    registry.register("img", img::run);
    registry.register("js", js::run);
    registry.register("makefile", makefile::run);
    registry.register("makepages", makepages::run);
    registry.register("manage", manage::run);
    registry.register("mkdir", mkdir::run);
    registry.register("service", service::run);
    registry.register("symlink", symlink::run);
    registry.register("synctree", synctree::run);
    registry.register("virtualenv", virtualenv::run);
    registry
  }

  /// Register `handler` under `name`, replacing any previous handler.
  pub fn register(&mut self, name: &str, handler: TaskHandler) {
    if self.handlers.insert(name.to_string(), handler).is_some() {
      warn!(task = name, "task handler replaced");
    }
  }

  pub fn get(&self, name: &str) -> Option<TaskHandler> {
    self.handlers.get(name).copied()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.handlers.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.handlers.keys().map(String::as_str)
  }

  /// Run `tasks` in order, stopping at the first failure.
  ///
  /// Every name is checked before anything runs, so a typo late in the list
  /// does not leave a half-finished deployment.
  pub fn run_all(&self, context: &DeployContext, tasks: &[TaskSpec]) -> Result<(), TaskError> {
    let handlers = tasks
      .iter()
      .map(|task| self.get(&task.name).ok_or_else(|| TaskError::UnknownTask(task.name.clone())))
      .collect::<Result<Vec<_>, _>>()?;

    for (index, (task, handler)) in tasks.iter().zip(handlers).enumerate() {
      info!(task = %task.name, "running task {}: {}", index + 1, task.name);
      handler(context, &task.args)?;
    }
    Ok(())
  }
}

/// Deserialize a task's argument table into its typed form.
pub(crate) fn parse_args<T: DeserializeOwned>(task: &str, args: &toml::Table) -> Result<T, TaskError> {
  toml::Value::Table(args.clone())
    .try_into()
    .map_err(|source| TaskError::InvalidArguments {
      task: task.to_string(),
      source,
    })
}

/// Run an asset pipeline, then optionally delete outputs no source produced.
pub(crate) fn run_pipeline<T: Transform>(
  context: &DeployContext,
  options: &PipelineOptions,
  transform: &T,
  destination: &Path,
  remove_stale: bool,
) -> Result<(), TaskError> {
  let outcome = check_dependencies(&context.access, options, transform)?;
  if remove_stale {
    remove_orphans(&context.access, destination, &outcome.outputs)?;
  }
  info!(
    destination = %destination.display(),
    updated = outcome.updated.len(),
    total = outcome.outputs.len(),
    "assets processed"
  );
  Ok(())
}

fn default_true() -> bool {
  true
}
