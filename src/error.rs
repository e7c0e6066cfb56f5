//! Error types for server startup and operation.
//!
//! Configuration problems are fatal at startup and reported to the operator.
//! Per-connection I/O failures never surface here; they are handled (and
//! swallowed) at the task boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Errors detected while resolving configuration, before any socket is opened.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}'", .0.display())]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}'", .0.display())]
    TomlParse(PathBuf, #[source] toml::de::Error),

    #[error("worker pool cannot be created with less than 1 thread (got {0})")]
    InvalidPoolSize(usize),

    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),
}

/// Top-level server failure.
///
/// `Io` covers fatal event-loop failures (the poll itself breaking) and
/// thread spawn errors; anything per-connection is handled locally instead.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("event loop failure")]
    Io(#[from] std::io::Error),
}
