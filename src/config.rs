use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context};
use serde::Deserialize;

use crate::scheduler::PollSettings;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub poll: PollConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PollConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds between polling ticks
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Feeds fetched per tick
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
    #[serde(default = "default_storage_timeout_seconds")]
    pub storage_timeout_seconds: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    "sqlite:bloggregator.db?mode=rwc".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_batch_size() -> i64 {
    10
}

fn default_fetch_timeout_seconds() -> u64 {
    30
}

fn default_storage_timeout_seconds() -> u64 {
    10
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_seconds: default_interval_seconds(),
            batch_size: default_batch_size(),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
            storage_timeout_seconds: default_storage_timeout_seconds(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_url: default_database_url(),
            poll: PollConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `DATABASE_URL`, `PORT`, `POLL_ENABLED`, `POLL_FREQUENCY_SECONDS`
    /// and `POLL_AMOUNT` on top of the file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("invalid PORT {:?}", port))?;
        }
        if let Some(enabled) = lookup("POLL_ENABLED") {
            self.poll.enabled = enabled
                .parse()
                .with_context(|| format!("invalid POLL_ENABLED {:?}", enabled))?;
        }
        if let Some(seconds) = lookup("POLL_FREQUENCY_SECONDS") {
            self.poll.interval_seconds = seconds
                .parse()
                .with_context(|| format!("invalid POLL_FREQUENCY_SECONDS {:?}", seconds))?;
        }
        if let Some(amount) = lookup("POLL_AMOUNT") {
            self.poll.batch_size = amount
                .parse()
                .with_context(|| format!("invalid POLL_AMOUNT {:?}", amount))?;
        }
        Ok(())
    }

    pub fn poll_settings(&self) -> anyhow::Result<PollSettings> {
        let poll = &self.poll;
        ensure!(poll.interval_seconds > 0, "poll interval must be positive");
        ensure!(poll.batch_size > 0, "poll batch size must be positive");
        ensure!(poll.fetch_timeout_seconds > 0, "fetch timeout must be positive");
        ensure!(poll.storage_timeout_seconds > 0, "storage timeout must be positive");

        Ok(PollSettings {
            interval: Duration::from_secs(poll.interval_seconds),
            batch_size: poll.batch_size,
            fetch_timeout: Duration::from_secs(poll.fetch_timeout_seconds),
            storage_timeout: Duration::from_secs(poll.storage_timeout_seconds),
        })
    }
}
