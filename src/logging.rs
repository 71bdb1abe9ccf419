//! `tracing` subscriber setup for the command-line tool.
//!
//! Logs go to stderr so the report on stdout stays clean. `RUST_LOG`
//! overrides the level chosen on the command line.

use std::io;

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
  #[default]
  Pretty,
  Compact,
  Json,
}

impl LogFormat {
  pub fn parse(name: &str) -> Option<Self> {
    match name {
      "pretty" => Some(LogFormat::Pretty),
      "compact" => Some(LogFormat::Compact),
      "json" => Some(LogFormat::Json),
      _ => None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
  pub level: Level,
  pub format: LogFormat,
  pub with_ansi: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    LogConfig {
      level: Level::WARN,
      format: LogFormat::default(),
      with_ansi: true,
    }
  }
}

impl LogConfig {
  /// `-q` drops to errors only; each `-v` raises the level one step
  /// above the default of warnings.
  pub fn from_flags(verbose: u64, quiet: bool) -> Self {
    let level = if quiet {
      Level::ERROR
    } else {
      match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
      }
    };
    LogConfig {
      level,
      ..LogConfig::default()
    }
  }
}

/// Installs the global subscriber. Call once, at startup.
pub fn init_logging(config: &LogConfig) {
  let filter = build_env_filter(config.level);
  let registry = tracing_subscriber::registry().with(filter);
  match config.format {
    LogFormat::Json => registry
      .with(fmt::layer().json().with_writer(io::stderr).with_target(false))
      .init(),
    LogFormat::Compact => registry
      .with(
        fmt::layer()
          .compact()
          .with_writer(io::stderr)
          .with_ansi(config.with_ansi)
          .with_target(false)
          .without_time(),
      )
      .init(),
    LogFormat::Pretty => registry
      .with(
        fmt::layer()
          .with_writer(io::stderr)
          .with_ansi(config.with_ansi)
          .with_target(false)
          .without_time(),
      )
      .init(),
  }
}

fn build_env_filter(level: Level) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    let level = level.as_str().to_lowercase();
    // other crates stay at warn
    EnvFilter::new(format!("warn,bibmerge={}", level))
  })
}
