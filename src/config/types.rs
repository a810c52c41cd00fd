use serde::Deserialize;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub target: Vec<TargetEntry>,
}

/// Task execution configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunnerConfig {
    /// Number of concurrent workers; 1 runs tasks sequentially
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Fetch attempts per request before giving up
    #[serde(rename = "retry-count", default = "default_retry_count")]
    pub retry_count: u32,
}

fn default_workers() -> usize {
    1
}

fn default_retry_count() -> u32 {
    3
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry_count: default_retry_count(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file; records are printed when absent
    #[serde(rename = "database-path")]
    pub database_path: Option<String>,
}

/// A page to harvest
#[derive(Debug, Clone, Deserialize)]
pub struct TargetEntry {
    pub url: String,
}
