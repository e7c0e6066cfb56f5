//! Configuration module for the hashpool server.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values. The port and the
//! worker pool size are required positional arguments; clap's typed parsing
//! rejects non-integer input with a non-zero exit before any socket is
//! opened.

use crate::error::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "hashpool")]
#[command(version = "0.1.0")]
#[command(about = "A scalable echo/hash server", long_about = None)]
pub struct CliArgs {
    /// Port to listen on for incoming connections
    pub port: u16,

    /// Number of threads in the worker pool
    pub workers: usize,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Maximum number of simultaneously registered connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub max_connections: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::merge(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they may reference.
    pub fn merge(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port,
            workers: cli.workers,
            max_connections: toml_config.server.max_connections,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}
