//! Tenantry Logging
//!
//! Installs a `tracing` subscriber for services built on tenantry.
//!
//! # Features
//!
//! - **Environment-controlled**: `TENANTRY_LOG_LEVEL` and `TENANTRY_LOG_FORMAT`
//! - **Structured logging**: JSON output by default, pretty or compact on request
//! - **`RUST_LOG` aware**: an explicit `RUST_LOG` filter always wins
//!
//! # Usage
//!
//! ```rust,no_run
//! use tenantry_log::{LogConfig, Format};
//!
//! let config = LogConfig::from_env().with_format(Format::Compact);
//! tenantry_log::init(&config).ok();
//!
//! tracing::info!(namespace = "acme", "engine created");
//! ```
//!
//! # Environment Variables
//!
//! - `TENANTRY_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `TENANTRY_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `TENANTRY_LOG_COLOR=1|0` - Enable/disable colors

use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level of events that reach the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Directive string understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_directive())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum log level
    #[serde(default = "default_level")]
    pub level: Level,
    /// Output format
    #[serde(default = "default_format")]
    pub format: Format,
    /// Whether ANSI colors are enabled
    #[serde(default)]
    pub color: bool,
    /// Whether to include the event target (module path)
    #[serde(default = "default_true")]
    pub with_target: bool,
}

fn default_level() -> Level {
    Level::Info
}

fn default_format() -> Format {
    Format::Json
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            color: false, // JSON output doesn't use colors
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(level) = env::var("TENANTRY_LOG_LEVEL").ok().and_then(|s| Level::parse(&s)) {
            config.level = level;
        }

        if let Some(format) = env::var("TENANTRY_LOG_FORMAT").ok().and_then(|s| Format::parse(&s)) {
            config.format = format;
        }

        config.color = env::var("TENANTRY_LOG_COLOR")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or_else(|_| env::var("NO_COLOR").is_err() && env::var("TERM").is_ok());

        config
    }

    /// Set the minimum level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable colors.
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Build the event filter. `RUST_LOG` takes precedence when set.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_directive()))
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Errors raised while installing the global subscriber.
#[derive(Error, Debug)]
pub enum LogError {
    /// A global subscriber was already installed.
    #[error("Failed to install log subscriber: {0}")]
    Init(String),
}

/// Install the global subscriber described by `config`.
///
/// Fails if another subscriber is already installed, which is common in
/// tests; callers usually ignore that case.
pub fn init(config: &LogConfig) -> Result<(), LogError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_ansi(config.color)
        .with_target(config.with_target);

    let result = match config.format {
        Format::Json => builder.json().with_current_span(true).try_init(),
        Format::Compact => builder.compact().try_init(),
        Format::Pretty => builder.pretty().try_init(),
    };

    result.map_err(|e| LogError::Init(e.to_string()))
}

/// Install the subscriber configured from environment variables.
pub fn init_from_env() -> Result<(), LogError> {
    init(&LogConfig::from_env())
}

// ============================================================================
// Tests
// ============================================================================
