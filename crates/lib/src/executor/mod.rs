//! Privilege-separated execution.
//!
//! Every operation that has to run as another user or group is executed in
//! a freshly forked child process. The child switches its effective group
//! and then its effective user, runs the operation, posts the outcome on a
//! pipe and exits. The parent never changes its own identity: it reads the
//! channel to end-of-file, reaps the child and turns the outcome back into
//! a `Result`.
//!
//! Payloads and errors cross the process boundary as JSON, so results must
//! implement `Serialize` and `DeserializeOwned`. Errors travel as their
//! rendered message.

mod channel;
pub mod types;

use std::any::Any;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork, pipe2, setegid, seteuid};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::identity::{Identity, ResolvedIdentity};

use channel::Marker;

pub use types::{ExecutionResult, ExecutorError};

/// Exit status of a child that could not write its outcome.
const CHILD_CHANNEL_FAILED: i32 = 101;

/// Run `operation` as `identity` in an isolated child process.
///
/// Names in `identity` are resolved before the child is spawned, so an
/// unknown user or group fails without side effects. The operation's return
/// value is handed back unchanged, including empty and zero values.
///
/// # Errors
///
/// - [`ExecutorError::IdentityResolution`] for unknown user/group names
/// - [`ExecutorError::IdentitySwitch`] when the child may not take on the identity
/// - [`ExecutorError::Operation`] carrying the message of the operation's error
/// - [`ExecutorError::ExecutorFailure`] when the child dies without reporting
pub fn run_as<T, E, F>(identity: &Identity, operation: F) -> Result<T, ExecutorError>
where
  T: Serialize + DeserializeOwned,
  E: fmt::Display,
  F: FnOnce() -> Result<T, E>,
{
  let resolved = identity.resolve()?;
  debug!(uid = ?resolved.uid, gid = ?resolved.gid, "running operation in privileged child");

  // Close-on-exec: tools the operation spawns must not inherit the write end.
  let (reader, writer) = pipe2(OFlag::O_CLOEXEC).map_err(ExecutorError::Spawn)?;

  // SAFETY: the child only runs the operation, writes to its end of the pipe
  // and leaves through `_exit`; it never returns into the caller's stack.
  match unsafe { fork() }.map_err(ExecutorError::Spawn)? {
    ForkResult::Child => {
      drop(reader);
      let report = run_in_child(resolved, operation);
      let mut channel = File::from(writer);
      let code = match channel.write_all(&report) {
        Ok(()) => 0,
        Err(_) => CHILD_CHANNEL_FAILED,
      };
      drop(channel);
      // SAFETY: `_exit` skips the exit handlers and stdio buffers the child
      // inherited from the parent, which must only be flushed once.
      unsafe { nix::libc::_exit(code) }
    }
    ForkResult::Parent { child } => {
      drop(writer);
      let mut bytes = Vec::new();
      let read = File::from(reader).read_to_end(&mut bytes);
      let status = reap(child)?;
      trace!(pid = child.as_raw(), status = ?status, bytes = bytes.len(), "privileged child finished");

      let failure = |reason: String| ExecutorError::ExecutorFailure {
        pid: child.as_raw(),
        reason,
      };

      if let Err(e) = read {
        return Err(failure(format!("failed to read result channel: {e}")));
      }
      if !matches!(status, WaitStatus::Exited(_, 0)) {
        return Err(failure(format!("abnormal termination: {status:?}")));
      }

      channel::decode::<T>(&bytes).map_err(failure)?.into_result()
    }
  }
}

/// Run `operation` as `identity`, taking arguments explicitly.
///
/// Convenience form of [`run_as`] for operations written as plain functions.
pub fn run_as_with<A, T, E, F>(identity: &Identity, operation: F, args: A) -> Result<T, ExecutorError>
where
  T: Serialize + DeserializeOwned,
  E: fmt::Display,
  F: FnOnce(A) -> Result<T, E>,
{
  run_as(identity, move || operation(args))
}

fn run_in_child<T, E, F>(identity: ResolvedIdentity, operation: F) -> Vec<u8>
where
  T: Serialize,
  E: fmt::Display,
  F: FnOnce() -> Result<T, E>,
{
  if let Err(message) = switch_identity(identity) {
    return channel::encode_failure(Marker::SwitchFailed { message });
  }

  match panic::catch_unwind(AssertUnwindSafe(operation)) {
    Ok(Ok(value)) => channel::encode_value(&value),
    Ok(Err(e)) => channel::encode_failure(Marker::Error {
      message: format!("{e:#}"),
    }),
    Err(payload) => channel::encode_failure(Marker::Error {
      message: format!("operation panicked: {}", panic_message(payload.as_ref())),
    }),
  }
}

/// Group first: once the effective user is no longer root the group can no
/// longer be changed.
fn switch_identity(identity: ResolvedIdentity) -> Result<(), String> {
  if let Some(gid) = identity.gid {
    setegid(gid).map_err(|e| format!("cannot set effective group to {gid}: {e}"))?;
  }
  if let Some(uid) = identity.uid {
    seteuid(uid).map_err(|e| format!("cannot set effective user to {uid}: {e}"))?;
  }
  Ok(())
}

fn reap(child: Pid) -> Result<WaitStatus, ExecutorError> {
  loop {
    match waitpid(child, None) {
      Err(Errno::EINTR) => continue,
      other => return other.map_err(ExecutorError::Wait),
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
