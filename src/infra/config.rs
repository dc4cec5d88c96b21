// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub finalizer: FinalizerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// Live-list polling cadence and page sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub retry_delay_secs: u64,
    pub base_page_size: u64,
    pub page_growth: u64,
    pub max_page_size: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 20,
            retry_delay_secs: 10,
            base_page_size: 1_000,
            page_growth: 10,
            max_page_size: 10_000_000,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Per-session recording resolution after a live ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalizerConfig {
    pub grace_delay_secs: u64,
    pub retry_delay_secs: u64,
    pub backfill_interval_secs: u64,
    pub backfill_iterations: u32,
    /// Substring that marks a playback URL as the complete recording.
    pub finalized_marker: String,
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self {
            grace_delay_secs: 10,
            retry_delay_secs: 10,
            backfill_interval_secs: 30 * 60,
            backfill_iterations: 30,
            finalized_marker: ".0-0.0".into(),
        }
    }
}

impl FinalizerConfig {
    pub fn grace_delay(&self) -> Duration {
        Duration::from_secs(self.grace_delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn backfill_interval(&self) -> Duration {
        Duration::from_secs(self.backfill_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub live_list_url: String,
    pub playback_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Host marker of the vendor whose URL becomes the primary playback link.
    pub primary_vendor: String,
    /// Host marker of the vendor whose URL becomes the backup link.
    pub backup_vendor: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            live_list_url: "https://api-new.app.acfun.cn/rest/app/live/channel".into(),
            playback_url: "https://api-new.acfunchina.com/rest/zt/live/playBack/startPlay".into(),
            request_timeout_secs: 10,
            user_agent: concat!("streamvault/", env!("CARGO_PKG_VERSION")).into(),
            primary_vendor: "alivod".into(),
            backup_vendor: "txvod".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(paths::db_path)
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.poll.page_growth < 2 {
            anyhow::bail!("poll.page_growth must be at least 2");
        }
        if self.poll.base_page_size == 0 || self.poll.base_page_size > self.poll.max_page_size {
            anyhow::bail!("poll.base_page_size must be between 1 and poll.max_page_size");
        }
        if self.finalizer.finalized_marker.is_empty() {
            anyhow::bail!("finalizer.finalized_marker must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.poll.interval(), Duration::from_secs(20));
        assert_eq!(c.poll.base_page_size, 1_000);
        assert_eq!(c.finalizer.backfill_iterations, 30);
        assert_eq!(c.finalizer.backfill_interval(), Duration::from_secs(1800));
        assert_eq!(c.finalizer.finalized_marker, ".0-0.0");
        assert!(c.store.path.is_none());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.poll.interval_secs, 20);
        assert_eq!(config.upstream.primary_vendor, "alivod");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[poll]
interval_secs = 30
retry_delay_secs = 5
base_page_size = 500
page_growth = 4
max_page_size = 64000

[finalizer]
grace_delay_secs = 20
retry_delay_secs = 3
backfill_interval_secs = 600
backfill_iterations = 12
finalized_marker = "-complete"

[store]
path = "/tmp/vault.db"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.poll.interval_secs, 30);
        assert_eq!(config.poll.page_growth, 4);
        assert_eq!(config.finalizer.backfill_iterations, 12);
        assert_eq!(config.finalizer.finalized_marker, "-complete");
        assert_eq!(config.store.resolved_path(), PathBuf::from("/tmp/vault.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: Config = toml::from_str("[finalizer]\nfinalized_marker = \"_done\"\n").unwrap();
        assert_eq!(config.finalizer.finalized_marker, "_done");
        assert_eq!(config.finalizer.backfill_iterations, 30);
    }

    #[test]
    fn test_validate_rejects_flat_growth() {
        let mut config = Config::default();
        config.poll.page_growth = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_marker() {
        let mut config = Config::default();
        config.finalizer.finalized_marker.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.poll.max_page_size, config.poll.max_page_size);
        assert_eq!(
            deserialized.upstream.live_list_url,
            config.upstream.live_list_url
        );
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }
}
