//! Implementation of the `wdeploy tasks` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use wdeploy_lib::config::{Config, locate};
use wdeploy_lib::tasks::TaskRegistry;

use crate::output::{OutputFormat, print_info, print_json, print_warning};

#[derive(Debug, Serialize)]
struct TaskEntry {
  index: usize,
  name: String,
  known: bool,
}

/// List the configured tasks in run order.
pub fn cmd_tasks(config: Option<&Path>, output: OutputFormat) -> Result<()> {
  let config = Config::load(&locate(config)).context("Failed to load configuration")?;
  let registry = TaskRegistry::builtin();

  let entries: Vec<TaskEntry> = config
    .tasks
    .iter()
    .enumerate()
    .map(|(i, task)| TaskEntry {
      index: i + 1,
      name: task.name.clone(),
      known: registry.contains(&task.name),
    })
    .collect();

  if output.is_json() {
    return print_json(&entries);
  }

  if entries.is_empty() {
    print_info("No tasks configured");
    return Ok(());
  }
  for entry in &entries {
    if entry.known {
      println!("{:>3}. {}", entry.index, entry.name);
    } else {
      print_warning(&format!("{:>3}. {} (unknown task)", entry.index, entry.name));
    }
  }
  Ok(())
}
