//! `manage`: run a Django `manage.py` command with a virtualenv's python.
//!
//! The command runs from the project directory, either as the invoking user
//! or as the deployment user.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use super::{DeployContext, TaskError, parse_args};
use crate::tools::run_tool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManageArgs {
  virtualenv: PathBuf,
  project: PathBuf,
  #[serde(default)]
  args: Vec<String>,
  run_as: RunAs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RunAs {
  #[serde(alias = "original")]
  Origin,
  #[serde(alias = "prefix")]
  Target,
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: ManageArgs = parse_args("manage", args)?;
  let python = context.destination_path(&args.virtualenv).join("bin").join("python");
  let project = context.destination_path(&args.project);

  let mut command = vec!["manage.py".to_string()];
  command.extend(args.args.iter().cloned());

  let operation = || run_tool(&python, &command, Some(&project)).map(|_| ());
  match args.run_as {
    RunAs::Origin => context.access.as_origin(operation)?,
    RunAs::Target => context.access.as_target(operation)?,
  }

  info!(project = %project.display(), command = ?args.args, run_as = ?args.run_as, "manage.py command finished");
  Ok(())
}
