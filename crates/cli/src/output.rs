//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, durations and Unicode symbols.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use sake_lib::execute::BuildStatus;

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

/// Format for `sake visual`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
  Dot,
  Json,
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const SKIP: &str = "-";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// One line per target: symbol, id and a dimmed detail.
pub fn print_target(id: &str, status: BuildStatus, detail: &str) {
  let symbol = match status {
    BuildStatus::Succeeded | BuildStatus::Fresh => format!(
      "{}",
      symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green())
    ),
    BuildStatus::Failed => format!("{}", symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red())),
    BuildStatus::Skipped => format!("{}", symbols::SKIP.if_supports_color(Stream::Stdout, |s| s.yellow())),
    BuildStatus::Stale | BuildStatus::Running => {
      format!("{}", symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.cyan()))
    }
  };

  if detail.is_empty() {
    println!("  {} {}", symbol, id);
  } else {
    println!(
      "  {} {} {}",
      symbol,
      id,
      format!("({})", detail).if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Last `lines` lines of `text`, for failure excerpts.
pub fn tail(text: &str, lines: usize) -> Vec<&str> {
  let all: Vec<&str> = text.lines().collect();
  all[all.len().saturating_sub(lines)..].to_vec()
}
