//! ## Features
//!
//! - Leveled console output (info, warn, error, debug, success) with colored prefixes
//! - Multi-line messages keep the prefix on every line
//! - Timestamped event lines for streamed activity
//! - Banner display for assistant replies and other important messages
//! - `tracing` subscriber setup driven by the `ROWKEEPER_LOG` env filter
//!
//! Console output always goes to stderr so command results on stdout stay pipeable.
//! Library crates log through `tracing`; binaries call [`init`] once and use the
//! console functions for user-facing lines.

use chrono::Local;
use colored::*;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter directive
pub const LOG_ENV: &str = "ROWKEEPER_LOG";

/// Directive used when `ROWKEEPER_LOG` is unset or invalid
pub const DEFAULT_DIRECTIVE: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Info,
  Warn,
  Error,
  Debug,
  Success,
}

impl Level {
  pub fn label(&self) -> &'static str {
    match self {
      Level::Info => "info",
      Level::Warn => "warn",
      Level::Error => "error",
      Level::Debug => "debug",
      Level::Success => "sccs",
    }
  }

  fn color(&self) -> Color {
    match self {
      Level::Info => Color::Blue,
      Level::Warn => Color::Yellow,
      Level::Error => Color::Red,
      Level::Debug => Color::Magenta,
      Level::Success => Color::Green,
    }
  }
}

/// Install the global tracing subscriber. Returns false if one was already installed.
pub fn init() -> bool {
  init_with_default(DEFAULT_DIRECTIVE)
}

pub fn init_with_default(default_directive: &str) -> bool {
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init()
    .is_ok()
}

/// Prefix padded so message text lines up across levels
pub fn prefix(level: Level, colorize: bool) -> String {
  let label = level.label();
  let padding = " ".repeat(7usize.saturating_sub(label.len() + 2));
  if colorize {
    format!("[{}]{padding}", label.color(level.color()).bold())
  } else {
    format!("[{label}]{padding}")
  }
}

/// Split a message into prefixed lines
pub fn format_lines(level: Level, message: &str, colorize: bool) -> Vec<String> {
  let prefix = prefix(level, colorize);
  message.lines().map(|line| format!("{prefix} {line}")).collect()
}

/// Write raw lines to stderr
pub fn log(message: &str) {
  for line in message.lines() {
    eprintln!("{line}");
  }
}

pub fn emit(level: Level, message: &str) {
  for line in format_lines(level, message, true) {
    log(&line);
  }
}

pub fn info(message: &str) {
  emit(Level::Info, message);
}

pub fn warn(message: &str) {
  emit(Level::Warn, message);
}

pub fn error(message: &str) {
  emit(Level::Error, message);
}

pub fn debug(message: &str) {
  emit(Level::Debug, message);
}

pub fn success(message: &str) {
  emit(Level::Success, message);
}

/// Timestamped event line, used for activity arriving over a stream
pub fn event(level: Level, message: &str) {
  let timestamp = Local::now().format("%H:%M:%S").to_string();
  let tag = match level {
    Level::Info => "event".blue().bold(),
    Level::Warn => "event".yellow().bold(),
    Level::Error => "event".red().bold(),
    Level::Debug => "event".magenta().bold(),
    Level::Success => "event".green().bold(),
  };
  for line in message.lines() {
    log(&format!("[{tag}] [{}] {line}", timestamp.cyan()));
  }
}

pub fn banner_line(length: usize, border: char) -> String {
  border.to_string().repeat(length)
}

/// Message framed by border lines
pub fn as_banner(message: &str, width: usize, border: char) -> Vec<String> {
  let line = banner_line(width, border);
  let mut framed = vec![line.clone()];
  framed.extend(message.lines().map(str::to_string));
  framed.push(line);
  framed
}

/// Highlight an important message (assistant replies, confirmations)
pub fn announce(message: &str) {
  for line in as_banner(message, 50, '-') {
    log(&line.blue().bold().to_string());
  }
}
