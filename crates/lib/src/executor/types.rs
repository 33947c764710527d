//! Error and result types for privilege-separated execution.

use thiserror::Error;

/// Errors raised by [`run_as`](super::run_as).
#[derive(Debug, Error)]
pub enum ExecutorError {
  /// A user or group name does not map to a known id.
  #[error("cannot resolve {kind} '{name}': {reason}")]
  IdentityResolution {
    kind: &'static str,
    name: String,
    reason: String,
  },

  /// The child could not take on the requested identity.
  #[error("failed to switch identity: {0}")]
  IdentitySwitch(String),

  /// The result channel or the child process could not be created.
  #[error("failed to spawn privileged child: {0}")]
  Spawn(#[source] nix::Error),

  /// The child could not be reaped.
  #[error("failed to wait for privileged child: {0}")]
  Wait(#[source] nix::Error),

  /// The child terminated without posting a result/error pair.
  #[error("privileged child {pid} terminated without a result: {reason}")]
  ExecutorFailure { pid: i32, reason: String },

  /// The operation itself failed. The message is the one raised in the child.
  #[error("{0}")]
  Operation(String),
}

/// Outcome a child reports through the result channel.
///
/// Exactly one of success or failure is populated; a legitimate empty or
/// zero payload is still a [`ExecutionResult::Success`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult<T> {
  /// The operation returned a value.
  Success(T),
  /// The operation returned an error or panicked.
  Failure(String),
  /// The child failed before running the operation.
  SwitchFailed(String),
}

impl<T> ExecutionResult<T> {
  pub fn into_result(self) -> Result<T, ExecutorError> {
    match self {
      ExecutionResult::Success(value) => Ok(value),
      ExecutionResult::Failure(message) => Err(ExecutorError::Operation(message)),
      ExecutionResult::SwitchFailed(message) => Err(ExecutorError::IdentitySwitch(message)),
    }
  }
}
