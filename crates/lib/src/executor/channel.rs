//! Wire format of the result channel between a privileged child and its parent.
//!
//! The child posts exactly two newline-terminated JSON messages: the payload
//! (`null` when there is none), then an outcome marker. The marker is what
//! decides success, so a `null`, `""` or `0` payload is never mistaken for a
//! failure.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::ExecutionResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum Marker {
  Ok,
  Error { message: String },
  SwitchFailed { message: String },
}

const EMPTY_PAYLOAD: &str = "null";

/// Encode a successful payload.
pub(crate) fn encode_value<T: Serialize>(value: &T) -> Vec<u8> {
  match serde_json::to_string(value) {
    Ok(payload) => frame(&payload, &Marker::Ok),
    Err(e) => encode_failure(Marker::Error {
      message: format!("failed to encode result: {e}"),
    }),
  }
}

/// Encode a failure with an empty payload.
pub(crate) fn encode_failure(marker: Marker) -> Vec<u8> {
  frame(EMPTY_PAYLOAD, &marker)
}

fn frame(payload: &str, marker: &Marker) -> Vec<u8> {
  let marker = serde_json::to_string(marker)
    .unwrap_or_else(|_| r#"{"status":"error","message":"unencodable outcome"}"#.to_string());
  format!("{payload}\n{marker}\n").into_bytes()
}

/// Decode the two messages read from the channel.
///
/// Returns a description of the problem when the channel is empty,
/// truncated or malformed.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<ExecutionResult<T>, String> {
  let text = std::str::from_utf8(bytes).map_err(|e| format!("channel is not UTF-8: {e}"))?;
  if text.is_empty() {
    return Err("channel is empty".to_string());
  }
  if !text.ends_with('\n') {
    return Err("channel was truncated".to_string());
  }

  let mut messages = text.split_terminator('\n');
  let payload = messages.next().unwrap_or_default();
  let Some(marker) = messages.next() else {
    return Err("outcome marker is missing".to_string());
  };
  if messages.next().is_some() {
    return Err("unexpected message after outcome marker".to_string());
  }

  let marker: Marker = serde_json::from_str(marker).map_err(|e| format!("malformed outcome marker: {e}"))?;
  match marker {
    Marker::Ok => serde_json::from_str(payload)
      .map(ExecutionResult::Success)
      .map_err(|e| format!("malformed payload: {e}")),
    Marker::Error { message } => Ok(ExecutionResult::Failure(message)),
    Marker::SwitchFailed { message } => Ok(ExecutionResult::SwitchFailed(message)),
  }
}
