//! CLI output formatting utilities.
//!
//! Status lines are colored when the stream is a terminal and plain
//! otherwise; `-o json` output goes through [`print_json`].

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{AnsiColors, OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Kind of a one-line status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
  Success,
  Error,
  Warning,
  Info,
}

impl Status {
  fn symbol(self) -> &'static str {
    match self {
      Status::Success => "✓",
      Status::Error => "✗",
      Status::Warning => "⚠",
      Status::Info => "•",
    }
  }

  fn color(self) -> AnsiColors {
    match self {
      Status::Success => AnsiColors::Green,
      Status::Error => AnsiColors::Red,
      Status::Warning => AnsiColors::Yellow,
      Status::Info => AnsiColors::Blue,
    }
  }

  /// Problems go to stderr so they never mix with `-o json` output.
  fn stream(self) -> Stream {
    match self {
      Status::Error | Status::Warning => Stream::Stderr,
      Status::Success | Status::Info => Stream::Stdout,
    }
  }

  /// Whether the message text is colored along with the symbol.
  fn colors_message(self) -> bool {
    matches!(self, Status::Error | Status::Warning)
  }
}

fn status_line(status: Status, message: &str) -> String {
  let stream = status.stream();
  let color = status.color();
  let symbol = status.symbol().if_supports_color(stream, |s| s.color(color)).to_string();
  let text = if status.colors_message() {
    message.if_supports_color(stream, |s| s.color(color)).to_string()
  } else {
    message.to_string()
  };
  format!("{symbol} {text}")
}

fn print_status(status: Status, message: &str) {
  let line = status_line(status, message);
  match status.stream() {
    Stream::Stderr => eprintln!("{line}"),
    _ => println!("{line}"),
  }
}

/// Human-readable duration, rounded to milliseconds.
pub fn format_duration(duration: Duration) -> String {
  let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}

pub fn print_success(message: &str) {
  print_status(Status::Success, message);
}

pub fn print_error(message: &str) {
  print_status(Status::Error, message);
}

pub fn print_warning(message: &str) {
  print_status(Status::Warning, message);
}

pub fn print_info(message: &str) {
  print_status(Status::Info, message);
}

/// An indented `label: value` line under a status message.
pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {value}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()));
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}
