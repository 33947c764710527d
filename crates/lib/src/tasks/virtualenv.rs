//! `virtualenv`: reproduce the packages of an existing virtualenv.
//!
//! The destination environment is created when missing, the source's
//! `pip freeze` is written to `requirements.txt` inside it and installed
//! with the destination's pip. This copies the package list, not the
//! environment itself.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::{DeployContext, TaskError, parse_args};
use crate::tools::{pipe_run, run_tool};

const REQUIREMENTS: &str = "requirements.txt";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VirtualenvArgs {
  /// Existing environment, relative to the root.
  source: PathBuf,
  /// Environment to build, relative to the prefix.
  destination: PathBuf,
  /// Interpreter for a newly created environment.
  python: Option<String>,
}

fn pip(env: &Path) -> PathBuf {
  env.join("bin").join("pip")
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: VirtualenvArgs = parse_args("virtualenv", args)?;
  let source = context.source_path(&args.source);
  let destination = context.destination_path(&args.destination);
  let access = &context.access;

  let exists = access.as_target(|| Ok::<_, std::io::Error>(destination.is_dir()))?;
  if !exists {
    let virtualenv = context.tools.which("virtualenv")?;
    let mut command = Vec::new();
    if let Some(python) = &args.python {
      command.push("-p".to_string());
      command.push(python.clone());
    }
    command.push(destination.to_string_lossy().into_owned());

    if let Some(parent) = destination.parent() {
      access.create_dir_all(parent)?;
    }
    access.as_target(|| run_tool(&virtualenv, &command, None).map(|_| ()))?;
    info!(destination = %destination.display(), "virtualenv created");
  } else {
    debug!(destination = %destination.display(), "virtualenv already present");
  }

  let source_pip = pip(&source);
  let requirements = access.as_origin(|| pipe_run(&source_pip, &["freeze"], b""))?;
  let requirements_path = destination.join(REQUIREMENTS);
  access.write(&requirements_path, &requirements)?;

  let install = [
    "install".to_string(),
    "-U".to_string(),
    "-r".to_string(),
    requirements_path.to_string_lossy().into_owned(),
  ];
  let destination_pip = pip(&destination);
  access.as_target(|| run_tool(&destination_pip, &install, None).map(|_| ()))?;

  info!(
    source = %source.display(),
    destination = %destination.display(),
    packages = requirements.split(|b| *b == b'\n').filter(|line| !line.is_empty()).count(),
    "virtualenv synchronised"
  );
  Ok(())
}
