//! Implementation of the `wdeploy check` command.

use std::path::Path;

use anyhow::{Context, Result, bail};

use wdeploy_lib::config::{Config, locate};
use wdeploy_lib::identity::Identity;
use wdeploy_lib::tasks::TaskRegistry;

use crate::output::{print_stat, print_success};

/// Load the configuration, resolve identities and check task names.
pub fn cmd_check(config: Option<&Path>) -> Result<()> {
  let path = locate(config);
  let config = Config::load(&path).context("Failed to load configuration")?;

  let target = Identity::new(
    config.user.clone().map(Into::into),
    config.group.clone().map(Into::into),
  );
  target.resolve().context("Invalid deployment identity")?;
  Identity::invoking_user()
    .resolve()
    .context("Invalid invoking identity")?;

  let registry = TaskRegistry::builtin();
  let unknown: Vec<&str> = config
    .tasks
    .iter()
    .map(|t| t.name.as_str())
    .filter(|name| !registry.contains(name))
    .collect();
  if !unknown.is_empty() {
    bail!("unknown task(s): {}", unknown.join(", "));
  }

  print_success("Configuration is valid");
  print_stat("Config", &config.path.display().to_string());
  print_stat("Root", &config.root.display().to_string());
  print_stat("Prefix", &config.prefix.display().to_string());
  print_stat("Tasks", &config.tasks.len().to_string());
  Ok(())
}
