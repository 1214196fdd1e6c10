use crate::Error;
use std::time::Duration;

/// Which entry to evict when a bounded cache is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionPolicy {
    /// Least recently used, by access stamp.
    Lru,
    /// Oldest insertion first.
    Fifo,
    /// A uniformly random entry.
    Random,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "LRU",
            EvictionPolicy::Fifo => "FIFO",
            EvictionPolicy::Random => "RANDOM",
        }
    }
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entry count. Unbounded when unset.
    pub max_size: Option<u64>,
    pub eviction_policy: EvictionPolicy,
    /// Whether to run the background TTL reaper.
    pub enable_auto_cleanup: bool,
    /// How often the reaper scans for expired entries.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: None,
            eviction_policy: EvictionPolicy::Lru,
            enable_auto_cleanup: true,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_size == Some(0) {
            return Err(Error::InvalidConfig("max_size must be at least 1 when set"));
        }
        if self.enable_auto_cleanup && self.cleanup_interval.is_zero() {
            return Err(Error::InvalidConfig("cleanup_interval must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        CacheConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let config = CacheConfig {
            max_size: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CacheConfig {
            cleanup_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_parses_from_json_with_humantime_durations() {
        let config: CacheConfig = serde_json::from_str(
            r#"{"max_size": 1024, "eviction_policy": "FIFO", "cleanup_interval": "5s"}"#,
        )
        .unwrap();
        assert_eq!(config.max_size, Some(1024));
        assert_eq!(config.eviction_policy, EvictionPolicy::Fifo);
        assert_eq!(config.cleanup_interval, Duration::from_secs(5));
        assert!(config.enable_auto_cleanup);
    }
}
