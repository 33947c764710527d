//! `cgi`: write the WSGI entry point of a Django application.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use super::{DeployContext, TaskError, parse_args};

const WSGI_SCRIPT: &str = "\
import os
os.environ.setdefault(\"DJANGO_SETTINGS_MODULE\", \"conf.settings\")
from django.core.wsgi import get_wsgi_application
application = get_wsgi_application()
";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CgiArgs {
  path: PathBuf,
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: CgiArgs = parse_args("cgi", args)?;
  let path = context.destination_path(&args.path);

  info!(path = %path.display(), "writing WSGI script");
  context.access.write(&path, WSGI_SCRIPT.as_bytes())?;
  Ok(())
}
