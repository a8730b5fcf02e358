//! Scheduler configuration parser (`scheduler.toml`).
//!
//! Every field has a default so an empty file yields a working scheduler.
//! Filter and weigher names are only checked for shape here; resolving them
//! to implementations happens when the scheduler builds its pipelines.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by [`SchedulerConfig::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("filter list contains an empty name")]
    EmptyFilterName,

    #[error("weigher list contains an empty name")]
    EmptyWeigherName,

    #[error("weigher {name} has a non-finite multiplier")]
    InvalidMultiplier { name: String },

    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Topic whose services and capability reports are scheduled onto.
    pub capability_topic: String,
    /// Enabled filters, run in this order.
    pub filters: Vec<String>,
    pub weight_handler: WeightHandlerKind,
    /// A service whose last heartbeat is older than this is down.
    pub service_down_time_secs: u64,
    pub telemetry_timeout_ms: u64,
    pub auth_timeout_ms: u64,
    /// Capability key holding the site identifier of a pool. Enables the
    /// site-aware affinity filters.
    pub site_attribute: Option<String>,
    /// Enabled weighers with optional multipliers.
    pub weighers: Vec<WeigherConfig>,
    pub shard: ShardConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeigherConfig {
    pub name: String,
    /// Falls back to the weigher's own default when unset.
    #[serde(default)]
    pub multiplier: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightHandlerKind {
    /// Normalize, combine, sort descending.
    #[default]
    Ordered,
    /// Weighted lottery over raw weights.
    Stochastic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    /// Project tags starting with this prefix name a shard.
    pub tag_prefix: String,
    /// Capability key a backend uses to advertise its shard.
    pub capability_key: String,
    /// How long resolved project tags are reused.
    pub cache_ttl_secs: u64,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            tag_prefix: "shard:".to_string(),
            capability_key: "shard".to_string(),
            cache_ttl_secs: 300,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capability_topic: "volume".to_string(),
            filters: vec![
                "AvailabilityZoneFilter".to_string(),
                "CapacityFilter".to_string(),
                "CapabilitiesFilter".to_string(),
            ],
            weight_handler: WeightHandlerKind::Ordered,
            service_down_time_secs: 60,
            telemetry_timeout_ms: 2_000,
            auth_timeout_ms: 2_000,
            site_attribute: None,
            weighers: vec![WeigherConfig {
                name: "CapacityWeigher".to_string(),
                multiplier: None,
            }],
            shard: ShardConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filters.iter().any(|f| f.trim().is_empty()) {
            return Err(ConfigError::EmptyFilterName);
        }
        for w in &self.weighers {
            if w.name.trim().is_empty() {
                return Err(ConfigError::EmptyWeigherName);
            }
            if w.multiplier.is_some_and(|m| !m.is_finite()) {
                return Err(ConfigError::InvalidMultiplier {
                    name: w.name.clone(),
                });
            }
        }
        if self.telemetry_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "telemetry_timeout_ms",
            });
        }
        if self.auth_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "auth_timeout_ms",
            });
        }
        Ok(())
    }

    pub fn service_down_time(&self) -> Duration {
        Duration::from_secs(self.service_down_time_secs)
    }

    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_millis(self.telemetry_timeout_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn shard_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.shard.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = SchedulerConfig::from_toml_str("").unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.capability_topic, "volume");
        assert_eq!(config.weight_handler, WeightHandlerKind::Ordered);
    }

    #[test]
    fn parses_pipelines() {
        let toml_str = r#"
filters = ["AvailabilityZoneFilter", "DifferentBackendFilter"]
weight_handler = "stochastic"
site_attribute = "site"

[[weighers]]
name = "CapacityWeigher"
multiplier = 2.0

[[weighers]]
name = "ChanceWeigher"

[shard]
cache_ttl_secs = 60
"#;
        let config = SchedulerConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.filters.len(), 2);
        assert_eq!(config.weight_handler, WeightHandlerKind::Stochastic);
        assert_eq!(config.weighers[0].multiplier, Some(2.0));
        assert_eq!(config.weighers[1].multiplier, None);
        assert_eq!(config.site_attribute.as_deref(), Some("site"));
        assert_eq!(config.shard_cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.shard.tag_prefix, "shard:");
    }

    #[test]
    fn rejects_zero_timeouts() {
        let err = SchedulerConfig::from_toml_str("telemetry_timeout_ms = 0").unwrap_err();
        assert!(err.to_string().contains("telemetry_timeout_ms"));
    }

    #[test]
    fn rejects_blank_names() {
        let mut config = SchedulerConfig::default();
        config.filters.push(" ".to_string());
        assert_eq!(config.validate(), Err(ConfigError::EmptyFilterName));
    }

    #[test]
    fn toml_round_trip() {
        let config = SchedulerConfig::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("CapacityFilter"));
        assert_eq!(SchedulerConfig::from_toml_str(&text).unwrap(), config);
    }
}
