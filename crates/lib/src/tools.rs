//! External tool discovery and invocation.
//!
//! Asset tasks shell out to minifiers and compilers. A tool is located by
//! name: `<NAME>_BIN` names the binary directly, `<NAME>_PATH` names the
//! directory holding it, otherwise every `PATH` entry is tried. Names are
//! upper-cased with `-` and `.` mapped to `_`, so `closure-compiler.sh` reads
//! `CLOSURE_COMPILER_SH_BIN`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum ToolError {
  #[error("tool {name:?} not found (from {variable} = {value})")]
  NotFound {
    name: String,
    variable: String,
    value: String,
  },

  #[error("none of the {purpose} tools is installed (tried {tried})")]
  NoneAvailable { purpose: &'static str, tried: String },

  #[error("failed to run {tool}: {source}")]
  Spawn {
    tool: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{tool} exited with {status}: {stderr}")]
  Failed {
    tool: PathBuf,
    status: String,
    stderr: String,
  },
}

/// A tool name and the fixed arguments it is always run with.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
  pub name: &'static str,
  pub args: &'static [&'static str],
}

/// Locates tools, caching every successful lookup for its own lifetime.
#[derive(Debug, Default)]
pub struct ToolFinder {
  cache: RefCell<HashMap<String, PathBuf>>,
}

impl ToolFinder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Full path of the tool called `name`.
  ///
  /// # Errors
  ///
  /// [`ToolError::NotFound`] naming the variable the search used.
  pub fn which(&self, name: &str) -> Result<PathBuf, ToolError> {
    if let Some(path) = self.cache.borrow().get(name) {
      return Ok(path.clone());
    }

    let prefix = env_prefix(name);
    let bin_var = format!("{prefix}_BIN");
    let path_var = format!("{prefix}_PATH");

    let (variable, value, found) = if let Some(bin) = std::env::var_os(&bin_var) {
      let path = PathBuf::from(&bin);
      let found = is_executable(&path).then_some(path);
      (bin_var, bin, found)
    } else if let Some(dir) = std::env::var_os(&path_var) {
      let found = Some(Path::new(&dir).join(name)).filter(|p| is_executable(p));
      (path_var, dir, found)
    } else {
      let search = std::env::var_os("PATH").unwrap_or_default();
      let found = std::env::split_paths(&search)
        .map(|dir| dir.join(name))
        .find(|p| is_executable(p));
      ("PATH".to_string(), search, found)
    };

    match found {
      Some(path) => {
        debug!(tool = name, path = %path.display(), "found tool");
        self.cache.borrow_mut().insert(name.to_string(), path.clone());
        Ok(path)
      }
      None => Err(ToolError::NotFound {
        name: name.to_string(),
        variable,
        value: value.to_string_lossy().into_owned(),
      }),
    }
  }

  pub fn is_present(&self, name: &str) -> bool {
    self.which(name).is_ok()
  }

  /// The first tool of `candidates` that is installed, with its arguments.
  pub fn first_of(
    &self,
    purpose: &'static str,
    candidates: &[ToolSpec],
  ) -> Result<(PathBuf, &'static [&'static str]), ToolError> {
    for candidate in candidates {
      if let Ok(path) = self.which(candidate.name) {
        return Ok((path, candidate.args));
      }
    }
    Err(ToolError::NoneAvailable {
      purpose,
      tried: candidates.iter().map(|c| c.name).collect::<Vec<_>>().join(", "),
    })
  }
}

/// Run `tool` with `input` on stdin and return its stdout.
///
/// # Errors
///
/// [`ToolError::Failed`] with the tool's stderr when it exits non-zero.
pub fn pipe_run<S: AsRef<str>>(tool: &Path, args: &[S], input: &[u8]) -> Result<Vec<u8>, ToolError> {
  let spawn_error = |source| ToolError::Spawn {
    tool: tool.to_path_buf(),
    source,
  };

  trace!(tool = %tool.display(), bytes = input.len(), "piping through tool");
  let mut child = Command::new(tool)
    .args(args.iter().map(AsRef::as_ref))
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .map_err(spawn_error)?;

  // Feed stdin from a second thread so a tool that streams output while it
  // reads cannot fill its stdout pipe and stall.
  let stdin = child.stdin.take();
  let output = std::thread::scope(|scope| {
    let feeder = scope.spawn(move || -> io::Result<()> {
      if let Some(mut stdin) = stdin {
        match stdin.write_all(input) {
          Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
          _ => {}
        }
      }
      Ok(())
    });
    let output = child.wait_with_output();
    let fed = feeder.join().unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
    output.and_then(|out| fed.map(|()| out))
  })
  .map_err(spawn_error)?;

  if !output.status.success() {
    return Err(ToolError::Failed {
      tool: tool.to_path_buf(),
      status: output.status.to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    });
  }
  Ok(output.stdout)
}

/// Run `tool` to completion, in `dir` when given, and return its stdout.
///
/// # Errors
///
/// [`ToolError::Failed`] with the tool's stderr when it exits non-zero.
pub fn run_tool<S: AsRef<OsStr>>(tool: &Path, args: &[S], dir: Option<&Path>) -> Result<Vec<u8>, ToolError> {
  let mut command = Command::new(tool);
  command.args(args).stdin(Stdio::null());
  if let Some(dir) = dir {
    command.current_dir(dir);
  }

  trace!(tool = %tool.display(), "running tool");
  let output = command.output().map_err(|source| ToolError::Spawn {
    tool: tool.to_path_buf(),
    source,
  })?;

  if !output.status.success() {
    return Err(ToolError::Failed {
      tool: tool.to_path_buf(),
      status: output.status.to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    });
  }
  Ok(output.stdout)
}

fn env_prefix(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
    .collect()
}

fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;

  std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}
