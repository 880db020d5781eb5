// ⚙️ Configuration - everything comes from the environment

use crate::cache::CacheConfig;
use anyhow::Context;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite file backing the row store
    pub database_path: PathBuf,
    /// port number of the API server
    pub port: u16,
    /// Seconds a cached read is served without refetching
    pub cache_stale_secs: i64,
    /// Seconds a cached read is kept as a fallback
    pub cache_retain_secs: i64,
    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_path = lookup("ERP_DATABASE_PATH")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "erp.db".to_string())
            .into();

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a port number")?;

        let cache_stale_secs = lookup("ERP_CACHE_STALE_SECS")
            .unwrap_or_else(|| "300".to_string())
            .parse::<i64>()
            .context("ERP_CACHE_STALE_SECS must be a number of seconds")?;

        let cache_retain_secs = lookup("ERP_CACHE_RETAIN_SECS")
            .unwrap_or_else(|| "600".to_string())
            .parse::<i64>()
            .context("ERP_CACHE_RETAIN_SECS must be a number of seconds")?;

        if cache_stale_secs < 0 || cache_retain_secs < 0 {
            anyhow::bail!("cache durations must not be negative");
        }

        let log_level = lookup("ERP_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Config {
            database_path,
            port,
            cache_stale_secs,
            cache_retain_secs,
            log_level,
        })
    }

    pub fn cache(&self) -> CacheConfig {
        CacheConfig::from_secs(self.cache_stale_secs, self.cache_retain_secs)
    }

    #[cfg(test)]
    pub fn new_testing() -> Self {
        Config {
            database_path: PathBuf::from(":memory:"),
            port: 0,
            cache_stale_secs: 300,
            cache_retain_secs: 600,
            log_level: "debug".to_string(),
        }
    }
}
