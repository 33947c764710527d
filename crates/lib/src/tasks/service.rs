//! `service`: start, stop or restart a system service.

use serde::Deserialize;
use tracing::info;

use super::{DeployContext, TaskError, parse_args};
use crate::tools::run_tool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceArgs {
  /// `start`, `stop`, `restart`, `reload`...
  action: String,
  name: String,
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: ServiceArgs = parse_args("service", args)?;

  // systemctl takes the action first, the SysV `service` wrapper the name.
  match context.tools.which("systemctl") {
    Ok(systemctl) => run_tool(&systemctl, &[&args.action, &args.name], None)?,
    Err(_) => {
      let service = context.tools.which("service")?;
      run_tool(&service, &[&args.name, &args.action], None)?
    }
  };

  info!(service = %args.name, action = %args.action, "service state changed");
  Ok(())
}
