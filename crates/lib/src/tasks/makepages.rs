//! `makepages`: assemble static pages from header, body and footer fragments.
//!
//! Every page body and decorator is an `.html` file in the source directory,
//! named without its extension in the task arguments. The headers and
//! footers count as dependencies of every page, so editing a decorator
//! regenerates all pages.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{DeployContext, TaskError, parse_args, run_pipeline};
use crate::access::FileAccess;
use crate::deps::{PipelineOptions, Transform, TransformError};

const TITLE_PLACEHOLDER: &str = "%TITLE%";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MakepagesArgs {
  source: PathBuf,
  destination: PathBuf,
  #[serde(default)]
  headers: Vec<String>,
  #[serde(default)]
  footers: Vec<String>,
  pages: Vec<Page>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Page {
  title: String,
  body: String,
}

fn html_name(name: &str) -> String {
  format!("{name}.html")
}

struct PageTransform {
  source: PathBuf,
  destination: PathBuf,
  headers: Vec<String>,
  footers: Vec<String>,
  titles: BTreeMap<PathBuf, String>,
}

impl PageTransform {
  fn concat(&self, access: &FileAccess, names: &[String]) -> Result<String, TransformError> {
    let mut text = String::new();
    for name in names {
      text.push_str(&access.read_to_string(&self.source.join(name))?);
    }
    Ok(text)
  }
}

impl Transform for PageTransform {
  fn is_candidate(&self, _full_path: &Path) -> bool {
    true
  }

  fn dependencies(&self, _access: &FileAccess, full_path: &Path) -> Result<Vec<String>, TransformError> {
    // Decorators themselves have no dependencies.
    let is_decorator = full_path
      .file_name()
      .and_then(|n| n.to_str())
      .is_some_and(|n| self.headers.iter().chain(&self.footers).any(|d| d == n));
    if is_decorator {
      return Ok(Vec::new());
    }
    Ok(self.headers.iter().chain(&self.footers).cloned().collect())
  }

  fn output_path(&self, relative_path: &Path) -> PathBuf {
    self.destination.join(relative_path)
  }

  fn update(&self, access: &FileAccess, source: &Path, output: &Path) -> Result<(), TransformError> {
    let relative = source.strip_prefix(&self.source).unwrap_or(source);
    let title = self.titles.get(relative).map(String::as_str).unwrap_or_default();

    let mut page = self.concat(access, &self.headers)?;
    page.push_str(&access.read_to_string(source)?);
    page.push_str(&self.concat(access, &self.footers)?);

    access.write(output, page.replace(TITLE_PLACEHOLDER, title).as_bytes())?;
    Ok(())
  }
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: MakepagesArgs = parse_args("makepages", args)?;
  let source = context.source_path(&args.source);
  let destination = context.destination_path(&args.destination);

  let titles: BTreeMap<PathBuf, String> = args
    .pages
    .iter()
    .map(|page| (PathBuf::from(html_name(&page.body)), page.title.clone()))
    .collect();
  let files = titles.keys().cloned().collect();

  let transform = PageTransform {
    source: source.clone(),
    destination: destination.clone(),
    headers: args.headers.iter().map(|h| html_name(h)).collect(),
    footers: args.footers.iter().map(|f| html_name(f)).collect(),
    titles,
  };
  let options = PipelineOptions::new(&source)
    .include_dirs(vec![source.clone()])
    .files(files);
  run_pipeline(context, &options, &transform, &destination, false)
}
