//! Logging plumbing shared by every crate in the workspace. Re-exports the
//! `slog` surface so downstream code can write `logging::debug!(log, ...)`
//! and builds root loggers from a sloggers TOML configuration.

use std::fmt;

pub use slog::{b, debug, error, info, o, trace, warn, Discard, Drain, Logger};

use sloggers::{Config, LoggerConfig};

const DEFAULT_CONFIG: &str = r#"
type = "terminal"
level = "info"
destination = "stderr"
"#;

#[derive(Debug)]
pub enum BuildError {
    Config(serdeconv::Error),
    Build(sloggers::Error),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BuildError::Config(err) => write!(f, "invalid logger config: {}", err),
            BuildError::Build(err) => write!(f, "logger construction failed: {}", err),
        }
    }
}

impl std::error::Error for BuildError {}

/// Builds a root logger from a sloggers `LoggerConfig` in TOML form.
pub fn from_toml(toml: &str) -> Result<Logger, BuildError> {
    let config: LoggerConfig = serdeconv::from_toml_str(toml).map_err(BuildError::Config)?;
    config.build_logger().map_err(BuildError::Build)
}

/// Builds the default terminal logger (info level, stderr).
pub fn init() -> Logger {
    match from_toml(DEFAULT_CONFIG) {
        Ok(logger) => logger,
        Err(err) => panic!("default logger config failed to build: {}", err),
    }
}

/// A root logger that swallows everything. Library types use this when the
/// caller does not supply a logger.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
