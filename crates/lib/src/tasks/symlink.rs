//! `symlink`: point a link at a file or directory below the prefix.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::{DeployContext, TaskError, parse_args};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SymlinkArgs {
  /// Link target, relative to the prefix.
  source: PathBuf,
  /// The link itself.
  destination: PathBuf,
}

pub(super) fn run(context: &DeployContext, args: &toml::Table) -> Result<(), TaskError> {
  let args: SymlinkArgs = parse_args("symlink", args)?;
  let target = context.destination_path(&args.source);
  let link = context.destination_path(&args.destination);

  let created = context.access.as_target(|| ensure_link(&target, &link))?;
  if created {
    info!(link = %link.display(), target = %target.display(), "symbolic link created");
  } else {
    debug!(link = %link.display(), "symbolic link already in place");
  }
  Ok(())
}

/// Create `link` pointing at `target`. Returns false when it already does.
fn ensure_link(target: &Path, link: &Path) -> Result<bool, String> {
  match fs::symlink_metadata(link) {
    Ok(metadata) if metadata.file_type().is_symlink() => {
      let current = fs::read_link(link).map_err(|e| format!("failed to read link {}: {e}", link.display()))?;
      if current == target {
        Ok(false)
      } else {
        Err(format!(
          "symbolic link {} already exists but points to {}",
          link.display(),
          current.display()
        ))
      }
    }
    Ok(_) => Err(format!(
      "cannot create symbolic link: {} already exists",
      link.display()
    )),
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      std::os::unix::fs::symlink(target, link)
        .map_err(|e| format!("failed to link {} to {}: {e}", link.display(), target.display()))?;
      Ok(true)
    }
    Err(e) => Err(format!("failed to stat {}: {e}", link.display())),
  }
}
