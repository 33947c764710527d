//! `css`: compile LESS and minify CSS.
//!
//! `.less` sources are compiled with `lessc` and then minified, `.css`
//! sources are only minified. Every output is named after its source with a
//! `.css` extension. `@import "x";` directives make a source depend on the
//! imported file, looked up in the include directories and then next to the
//! importing file.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::{DeployContext, TaskError, default_true, parse_args, run_pipeline};
use crate::access::FileAccess;
use crate::deps::{PipelineOptions, Transform, TransformError};
use crate::tools::{ToolFinder, ToolSpec, pipe_run};

static IMPORT_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"@import(?: +)"(?P<import>.+)";"#).expect("import pattern is valid"));

const LESSC: &str = "lessc";
const LESSC_ARGS: [&str; 5] = ["-sm", "on", "-ru", "-x", "-"];

const MINIFIERS: [ToolSpec; 2] = [
  ToolSpec {
    name: "cleancss",
    args: &["-e", "--s1", "-s"],
  },
  ToolSpec {
    name: "cssmin",
    args: &[],
  },
];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CssArgs {
  source: PathBuf,
  destination: PathBuf,
  #[serde(default)]
  include_dirs: Vec<PathBuf>,
  #[serde(default = "default_true")]
  remove_stale: bool,
}

/// Stylesheet transform: dependency extraction plus the lessc/minifier chain.
#[derive(Debug)]
pub struct CssTransform<'a> {
  tools: &'a ToolFinder,
  destination: PathBuf,
  include_dirs: Vec<PathBuf>,
}

impl<'a> CssTransform<'a> {
  pub fn new(tools: &'a ToolFinder, destination: PathBuf, include_dirs: Vec<PathBuf>) -> Self {
    Self {
      tools,
      destination,
      include_dirs,
    }
  }
}

/// Identifiers named by `@import "...";` directives, in order.
pub fn extract_imports(text: &str) -> Vec<String> {
  IMPORT_RE
    .captures_iter(text)
    .map(|c| c["import"].to_string())
    .collect()
}

impl Transform for CssTransform<'_> {
  fn is_candidate(&self, full_path: &Path) -> bool {
    full_path.extension().is_some_and(|e| e == "css" || e == "less")
  }

  fn dependencies(&self, access: &FileAccess, full_path: &Path) -> Result<Vec<String>, TransformError> {
    Ok(extract_imports(&access.read_to_string(full_path)?))
  }

  fn output_path(&self, relative_path: &Path) -> PathBuf {
    self.destination.join(relative_path.with_extension("css"))
  }

  fn update(&self, access: &FileAccess, source: &Path, output: &Path) -> Result<(), TransformError> {
    let (minifier, minifier_args) = self.tools.first_of("CSS minifier", &MINIFIERS)?;
    let lessc = if source.extension().is_some_and(|e| e == "less") {
      let mut args: Vec<String> = self
        .include_dirs
        .iter()
        .map(|dir| format!("--include-path={}", dir.display()))
        .collect();
      args.extend(LESSC_ARGS.iter().map(|a| a.to_string()));
      Some((self.tools.which(LESSC)?, args))
    } else {
      None
    };

    let css = access.as_origin(|| -> Result<Vec<u8>, String> {
      let input = std::fs::read(source).map_err(|e| format!("failed to read {}: {e}", source.display()))?;
      let plain = match &lessc {
        Some((tool, args)) => pipe_run(tool, args.as_slice(), &input).map_err(|e| e.to_string())?,
        None => input,
      };
      pipe_run(&minifier, minifier_args, &plain).map_err(|e| e.to_string())
    })?;

    access.write(output, &css)?;
    Ok(())
  }
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: CssArgs = parse_args("css", args)?;
  let source = context.source_path(&args.source);
  let destination = context.destination_path(&args.destination);
  let include_dirs: Vec<PathBuf> = args.include_dirs.iter().map(|d| context.source_path(d)).collect();

  let transform = CssTransform::new(&context.tools, destination.clone(), include_dirs.clone());
  let options = PipelineOptions::new(source)
    .include_dirs(include_dirs)
    .local_include(true);
  run_pipeline(context, &options, &transform, &destination, args.remove_stale)
}
