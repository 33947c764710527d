//! `a2site`: enable or disable an Apache site with `a2ensite`/`a2dissite`.

use serde::Deserialize;
use tracing::info;

use super::{DeployContext, TaskError, default_true, parse_args};
use crate::tools::run_tool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct A2siteArgs {
  site: String,
  #[serde(default = "default_true")]
  enable: bool,
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: A2siteArgs = parse_args("a2site", args)?;
  let tool = if args.enable { "a2ensite" } else { "a2dissite" };

  run_tool(&context.tools.which(tool)?, &[&args.site], None)?;
  info!(site = %args.site, enabled = args.enable, "apache site updated");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tasks::testing::{args, context};
  use crate::util::testutil::fake_tool;
  use serial_test::serial;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  #[serial]
  fn picks_the_tool_from_the_flag() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("calls");
    let script = |name: &str| format!("echo \"{name} $*\" >> {}", log.display());
    let enable = fake_tool(temp.path(), "a2ensite", &script("a2ensite"));
    let disable = fake_tool(temp.path(), "a2dissite", &script("a2dissite"));
    let ctx = context(temp.path(), temp.path());

    temp_env::with_vars(
      [("A2ENSITE_BIN", Some(enable.as_os_str())), ("A2DISSITE_BIN", Some(disable.as_os_str()))],
      || {
        run(&ctx, &args("site = \"blog\"")).unwrap();
        run(&ctx, &args("site = \"legacy\"\nenable = false")).unwrap();
      },
    );

    assert_eq!(fs::read_to_string(&log).unwrap(), "a2ensite blog\na2dissite legacy\n");
  }

  #[test]
  #[serial]
  fn tool_failure_is_reported() {
    let temp = TempDir::new().unwrap();
    let enable = fake_tool(temp.path(), "a2ensite", "echo 'ERROR: Site nope does not exist!' >&2; exit 1");

    temp_env::with_var("A2ENSITE_BIN", Some(enable.as_os_str()), || {
      let err = run(&context(temp.path(), temp.path()), &args("site = \"nope\"")).unwrap_err();
      assert!(err.to_string().contains("Site nope does not exist"));
    });
  }
}
