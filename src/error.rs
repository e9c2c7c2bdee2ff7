// src/error.rs

//! Crate-wide error type

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while evaluating or running migrations
///
/// Data conditions (`parsing_error`, `bad`) and "nothing to change" are not
/// errors; they surface as skip reasons and [`crate::MigrationOutcome::NoOp`].
#[derive(Error, Debug)]
pub enum Error {
    /// Reading or writing a recipe or feedstock file failed
    #[error("I/O error: {0}")]
    IoError(String),

    /// A graph snapshot, config file or YAML document could not be decoded
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A node is referenced by the graph but carries no payload
    #[error("Graph inconsistency: node '{node}' has no payload")]
    GraphInconsistency { node: String },

    /// A job definition is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A requested job or feedstock does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(format!("invalid JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ParseError(format!("invalid YAML: {}", err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::ParseError(format!("invalid TOML: {}", err))
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::ConfigError(format!("invalid pattern: {}", err))
    }
}
