//! `img`: optimise PNG, JPEG and SVG images.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{DeployContext, TaskError, default_true, parse_args, run_pipeline};
use crate::access::FileAccess;
use crate::deps::{PipelineOptions, Transform, TransformError};
use crate::tools::{ToolFinder, ToolSpec, pipe_run};

const PNG: ToolSpec = ToolSpec {
  name: "pngcrush_wrapper",
  args: &[],
};
const JPEG: ToolSpec = ToolSpec {
  name: "jpegtran",
  args: &["-optimize", "-progressive", "-copy", "none"],
};
const SVG: ToolSpec = ToolSpec {
  name: "svgo",
  args: &["-i", "-", "-o", "-", "--multipass"],
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImgArgs {
  source: PathBuf,
  destination: PathBuf,
  #[serde(default = "default_true")]
  remove_stale: bool,
}

/// Lower-cased extension of `path`.
fn extension(path: &Path) -> Option<String> {
  path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn optimizer_for(path: &Path) -> Option<(&'static str, ToolSpec)> {
  match extension(path)?.as_str() {
    "png" => Some(("PNG", PNG)),
    "jpg" | "jpeg" => Some(("JPEG", JPEG)),
    "svg" => Some(("SVG", SVG)),
    _ => None,
  }
}

/// Mirrors images through a per-format optimiser.
#[derive(Debug)]
pub struct ImageTransform<'a> {
  tools: &'a ToolFinder,
  destination: PathBuf,
}

impl<'a> ImageTransform<'a> {
  pub fn new(tools: &'a ToolFinder, destination: PathBuf) -> Self {
    Self { tools, destination }
  }
}

impl Transform for ImageTransform<'_> {
  fn is_candidate(&self, full_path: &Path) -> bool {
    optimizer_for(full_path).is_some()
  }

  fn output_path(&self, relative_path: &Path) -> PathBuf {
    self.destination.join(relative_path)
  }

  fn update(&self, access: &FileAccess, source: &Path, output: &Path) -> Result<(), TransformError> {
    let (format, spec) =
      optimizer_for(source).ok_or_else(|| format!("unknown image extension: {}", source.display()))?;
    let (tool, args) = self.tools.first_of(format, &[spec])?;
    let optimized = access.as_origin(|| -> Result<Vec<u8>, String> {
      let input = std::fs::read(source).map_err(|e| format!("failed to read {}: {e}", source.display()))?;
      pipe_run(&tool, args, &input).map_err(|e| e.to_string())
    })?;
    access.write(output, &optimized)?;
    Ok(())
  }
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: ImgArgs = parse_args("img", args)?;
  let source = context.source_path(&args.source);
  let destination = context.destination_path(&args.destination);

  let transform = ImageTransform::new(&context.tools, destination.clone());
  let options = PipelineOptions::new(source).local_include(true);
  run_pipeline(context, &options, &transform, &destination, args.remove_stale)
}
