//! Implementation of the `wdeploy run` command.
//!
//! Loads the configuration, takes the project lock and runs the configured
//! tasks in order. Identity switches need root; without it the command can
//! re-execute itself through sudo.

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::info;

use wdeploy_lib::config::{Config, TaskSpec, locate};
use wdeploy_lib::identity::is_elevated;
use wdeploy_lib::lock::DeployLock;
use wdeploy_lib::tasks::{DeployContext, TaskRegistry};

use crate::output::{format_duration, print_stat, print_success, print_warning};

pub fn cmd_run(config: Option<&Path>, only: &[String], sudo: bool) -> Result<()> {
  if !is_elevated() {
    if sudo {
      return reexec_with_sudo();
    }
    print_warning("Not running as root: switching to the deployment user or group will likely fail");
  }

  let start = Instant::now();
  let config = Config::load(&locate(config)).context("Failed to load configuration")?;
  let tasks = select_tasks(&config.tasks, only)?;

  let command = std::env::args().collect::<Vec<_>>().join(" ");
  let _lock = DeployLock::acquire(&config.root, &command).context("Failed to acquire deployment lock")?;

  info!(config = %config.path.display(), tasks = tasks.len(), "starting deployment");
  let context = DeployContext::new(config);
  TaskRegistry::builtin()
    .run_all(&context, &tasks)
    .context("Deployment failed")?;

  println!();
  print_success("Deployment complete!");
  print_stat("Prefix", &context.config.prefix.display().to_string());
  print_stat("Tasks run", &tasks.len().to_string());
  print_stat("Duration", &format_duration(start.elapsed()));
  Ok(())
}

/// Keep the configured tasks named in `only`, in configuration order.
fn select_tasks(configured: &[TaskSpec], only: &[String]) -> Result<Vec<TaskSpec>> {
  if only.is_empty() {
    return Ok(configured.to_vec());
  }
  if let Some(missing) = only.iter().find(|name| !configured.iter().any(|t| &t.name == *name)) {
    bail!("no configured task named {missing:?}");
  }
  Ok(
    configured
      .iter()
      .filter(|t| only.contains(&t.name))
      .cloned()
      .collect(),
  )
}

/// Replace this process with `sudo -E <self> <args without --sudo>`.
fn reexec_with_sudo() -> Result<()> {
  let exe = std::env::current_exe().context("Failed to locate the wdeploy executable")?;
  let args: Vec<String> = std::env::args().skip(1).filter(|a| a != "--sudo").collect();

  info!(exe = %exe.display(), "re-executing through sudo");
  let err = Command::new("sudo").arg("-E").arg(exe).args(args).exec();
  Err(err).context("Failed to re-execute through sudo")
}
