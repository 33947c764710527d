//! Project configuration.
//!
//! A project is described by a `wdeploy.toml` file:
//!
//! ```toml
//! prefix = "/srv/www/site"
//! user = "www-data"
//! group = "www-data"
//! permissions = "750"
//!
//! [[tasks]]
//! task = "css"
//! source = "static/less"
//! destination = "static/css"
//! ```
//!
//! Relative `root` and `prefix` values resolve against the directory holding
//! the configuration file.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::{CONFIG_ENV, CONFIG_FILENAME};
use crate::util::resolve_under;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("configuration file not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid configuration {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid permissions {0:?}: expected an octal mask such as \"750\"")]
  Permissions(String),

  #[error("task #{index} has no `task` name")]
  MissingTaskName { index: usize },
}

/// One configured task: its name and the rest of its table as arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
  pub name: String,
  pub args: toml::Table,
}

/// A loaded, path-resolved project configuration.
#[derive(Debug, Clone)]
pub struct Config {
  /// The file this configuration was read from.
  pub path: PathBuf,
  /// Source root. Source-side task paths are relative to it.
  pub root: PathBuf,
  /// Output root. Destination-side task paths are relative to it.
  pub prefix: PathBuf,
  pub user: Option<String>,
  pub group: Option<String>,
  /// Mode applied to created directories and written files.
  pub permissions: Option<u32>,
  pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
  root: Option<PathBuf>,
  prefix: PathBuf,
  user: Option<String>,
  group: Option<String>,
  permissions: Option<String>,
  #[serde(default)]
  tasks: Vec<toml::Table>,
}

impl Config {
  /// Read and resolve the configuration at `path`.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    if !path.is_file() {
      return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let path = dunce::canonicalize(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
      path: path.clone(),
      source,
    })?;
    Self::parse(&text, &path)
  }

  /// Parse configuration text as if it was read from `path`.
  pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
    let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    let base = path.parent().unwrap_or(Path::new("."));
    let root = match &raw.root {
      Some(root) => resolve_under(base, root),
      None => base.to_path_buf(),
    };
    let prefix = resolve_under(base, &raw.prefix);
    let permissions = raw.permissions.as_deref().map(parse_permissions).transpose()?;

    let tasks = raw
      .tasks
      .into_iter()
      .enumerate()
      .map(|(index, mut args)| match args.remove("task") {
        Some(toml::Value::String(name)) => Ok(TaskSpec { name, args }),
        _ => Err(ConfigError::MissingTaskName { index }),
      })
      .collect::<Result<Vec<_>, _>>()?;

    let config = Self {
      path: path.to_path_buf(),
      root: dunce::simplified(&root).to_path_buf(),
      prefix: dunce::simplified(&prefix).to_path_buf(),
      user: raw.user.filter(|u| !u.is_empty()),
      group: raw.group.filter(|g| !g.is_empty()),
      permissions,
      tasks,
    };
    debug!(
      path = %config.path.display(),
      root = %config.root.display(),
      prefix = %config.prefix.display(),
      tasks = config.tasks.len(),
      "configuration loaded"
    );
    Ok(config)
  }
}

/// Parse an octal permission mask such as `"750"` or `"0640"`.
pub fn parse_permissions(mask: &str) -> Result<u32, ConfigError> {
  let digits = mask.trim();
  match u32::from_str_radix(digits, 8) {
    Ok(mode) if !digits.is_empty() && mode <= 0o7777 => Ok(mode),
    _ => Err(ConfigError::Permissions(mask.to_string())),
  }
}

/// Find the configuration file to use.
///
/// An explicit path wins, then [`CONFIG_ENV`] (a file, or a directory holding
/// [`CONFIG_FILENAME`]), then [`CONFIG_FILENAME`] in the working directory.
pub fn locate(explicit: Option<&Path>) -> PathBuf {
  if let Some(path) = explicit {
    return path.to_path_buf();
  }
  if let Some(value) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
    let path = PathBuf::from(value);
    return if path.is_dir() { path.join(CONFIG_FILENAME) } else { path };
  }
  PathBuf::from(CONFIG_FILENAME)
}
