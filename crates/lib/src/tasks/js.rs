//! `js`: minify JavaScript sources.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{DeployContext, TaskError, default_true, parse_args, run_pipeline};
use crate::access::FileAccess;
use crate::deps::{PipelineOptions, Transform, TransformError};
use crate::tools::{ToolFinder, ToolSpec, pipe_run};

const MINIFIERS: [ToolSpec; 3] = [
  ToolSpec {
    name: "closure-compiler.sh",
    args: &[],
  },
  ToolSpec {
    name: "uglifyjs",
    args: &["-c", "-m"],
  },
  ToolSpec {
    name: "yui-compressor",
    args: &["--type", "js", "--charset", "utf-8"],
  },
];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsArgs {
  source: PathBuf,
  destination: PathBuf,
  #[serde(default = "default_true")]
  remove_stale: bool,
}

/// Mirrors `.js` files through the first available minifier.
#[derive(Debug)]
pub struct JsTransform<'a> {
  tools: &'a ToolFinder,
  destination: PathBuf,
}

impl<'a> JsTransform<'a> {
  pub fn new(tools: &'a ToolFinder, destination: PathBuf) -> Self {
    Self { tools, destination }
  }
}

impl Transform for JsTransform<'_> {
  fn is_candidate(&self, full_path: &Path) -> bool {
    full_path.extension().is_some_and(|e| e == "js")
  }

  fn output_path(&self, relative_path: &Path) -> PathBuf {
    self.destination.join(relative_path)
  }

  fn update(&self, access: &FileAccess, source: &Path, output: &Path) -> Result<(), TransformError> {
    let (minifier, args) = self.tools.first_of("JavaScript minifier", &MINIFIERS)?;
    let minified = access.as_origin(|| -> Result<Vec<u8>, String> {
      let input = std::fs::read(source).map_err(|e| format!("failed to read {}: {e}", source.display()))?;
      pipe_run(&minifier, args, &input).map_err(|e| format!("error when minifying {}: {e}", source.display()))
    })?;
    access.write(output, &minified)?;
    Ok(())
  }
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: JsArgs = parse_args("js", args)?;
  let source = context.source_path(&args.source);
  let destination = context.destination_path(&args.destination);

  let transform = JsTransform::new(&context.tools, destination.clone());
  let options = PipelineOptions::new(source).local_include(true);
  run_pipeline(context, &options, &transform, &destination, args.remove_stale)
}
