//! `makefile`: run a target of a project Makefile.
//!
//! Make runs from the Makefile's directory with every entry of `vars` passed
//! as a `KEY=value` assignment. Unless `run_as_root` is set, it is started
//! through `sudo -u <user>` so recipes run as the configured deployment user.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use super::{DeployContext, TaskError, parse_args};
use crate::tools::run_tool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MakefileArgs {
  /// Makefile path, relative to the root.
  script: PathBuf,
  target: String,
  #[serde(default)]
  vars: BTreeMap<String, String>,
  #[serde(default)]
  run_as_root: bool,
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: MakefileArgs = parse_args("makefile", args)?;
  let script = context.source_path(&args.script);
  let (Some(dir), Some(file)) = (script.parent(), script.file_name()) else {
    return Err(TaskError::Failed(format!("not a Makefile path: {}", script.display())));
  };

  let make = context.tools.which("make")?;
  let mut command: Vec<OsString> = Vec::new();
  let user = context.config.user.as_deref().filter(|_| !args.run_as_root);
  if let Some(user) = user {
    command.push(context.tools.which("sudo")?.into_os_string());
    command.push("-u".into());
    command.push(user.into());
  }
  command.push(make.into_os_string());
  command.push("-f".into());
  command.push(file.to_os_string());
  command.push(args.target.clone().into());
  command.extend(args.vars.iter().map(|(key, value)| assignment(key, value).into()));

  let (program, rest) = command.split_first().ok_or_else(|| TaskError::Failed("empty command".to_string()))?;
  run_tool(Path::new(program), rest, Some(dir))?;

  info!(makefile = %script.display(), target = %args.target, user = ?user, "makefile target built");
  Ok(())
}

/// `KEY=value` with spaces escaped so make keeps the value in one word.
fn assignment(key: &str, value: &str) -> String {
  format!("{key}={}", value.replace(' ', "\\ "))
}
