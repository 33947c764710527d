//! `mkdir`: create a directory below the prefix.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use super::{DeployContext, TaskError, parse_args};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MkdirArgs {
  path: PathBuf,
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: MkdirArgs = parse_args("mkdir", args)?;
  let path = context.destination_path(&args.path);

  info!(path = %path.display(), "creating directory");
  context.access.create_dir_all(&path)?;
  Ok(())
}
