use serde::Deserialize;
use std::time::Duration;

use crate::source::RetryPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Entries requested per listing page.
    pub page_size: i32,
    /// Fixed sleep between rate-limited retries, in seconds.
    pub rate_limit_wait_secs: f64,
    /// Cap on rate-limit retries per page; absent means retry indefinitely.
    pub rate_limit_max_attempts: Option<u32>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            rate_limit_wait_secs: 1.0,
            rate_limit_max_attempts: None,
        }
    }
}

impl AppConfig {
    /// Loads CONFIG_FILE (default: config.toml). A missing file yields the
    /// default config; a present but invalid file is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        match std::fs::read_to_string(&path) {
            Ok(s) => Self::load_from_str(&s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.query.page_size > 0,
            "query.page_size must be > 0, got {}",
            self.query.page_size
        );
        anyhow::ensure!(
            self.query.rate_limit_wait_secs > 0.0,
            "query.rate_limit_wait_secs must be > 0, got {}",
            self.query.rate_limit_wait_secs
        );
        if let Some(n) = self.query.rate_limit_max_attempts {
            anyhow::ensure!(
                n > 0,
                "query.rate_limit_max_attempts must be > 0 when set, got {n}"
            );
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            wait: Duration::from_secs_f64(self.query.rate_limit_wait_secs),
            max_attempts: self.query.rate_limit_max_attempts,
        }
    }
}
