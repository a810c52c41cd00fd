//! Sumi-Harvest: transactional crawl tasks
//!
//! This crate runs crawl tasks that fetch a page, parse it and store what
//! they find, committing everything they stored as one transaction. Storing
//! goes through a generic record mapping into SQLite upserts, and several
//! tasks can share one transaction that commits only if all of them succeed.

pub mod config;
pub mod crawler;
pub mod schema;
pub mod storage;
pub mod task;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{code} {reason}")]
    Status { code: u16, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Response body already consumed")]
    BodyClosed,

    #[error("Runner is closed")]
    RunnerClosed,

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Task(#[from] anyhow::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run, Runner};
pub use schema::{Entity, Record};
pub use storage::{Storer, Tx};
pub use task::AnyTask;
