//! Cache subsystem configuration
//!
//! Loaded from `cache.json` in the config directory. Every field has a
//! default so a missing or partial file still yields a working config.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding per-account partition databases. Defaults to the
    /// platform data directory when unset.
    pub data_dir: Option<PathBuf>,
    /// Seconds between background sync cycles per account
    pub sync_interval_secs: u64,
    /// Seconds a resource stays fresh before a cycle re-fetches it
    pub cache_ttl_secs: u64,
    /// Replay attempts before a queued action is dropped
    pub max_action_attempts: u32,
    /// Upper bound on any single remote call
    pub remote_timeout_secs: u64,
    /// Calendars refreshed during a sync cycle
    pub calendars: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sync_interval_secs: 60,
            cache_ttl_secs: 300,
            max_action_attempts: 3,
            remote_timeout_secs: 30,
            calendars: vec!["primary".to_string()],
        }
    }
}

impl CacheConfig {
    const FILENAME: &'static str = "cache.json";

    /// Load from `cache.json`, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        Ok(config::load_json(Self::FILENAME)?.unwrap_or_default())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// Resolve the partition directory, creating the default if needed
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => config::ensure_data_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.sync_interval_secs, 60);
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.max_action_attempts, 3);
        assert_eq!(config.calendars, vec!["primary".to_string()]);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: CacheConfig = serde_json::from_str(r#"{"sync_interval_secs": 15}"#).unwrap();
        assert_eq!(config.sync_interval_secs, 15);
        assert_eq!(config.cache_ttl_secs, 300);
    }
}
