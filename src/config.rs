use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::geofence::collection_name_from_arn;
use crate::render::DedupPolicy;
use crate::service::MAX_PAGE_SIZE;
use crate::sync::{UpdateFilter, DEFAULT_QUEUE_DEPTH};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid duration for {field}: {message}")]
    Duration { field: &'static str, message: String },
    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub geofence: Option<GeofenceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub identity_pool_id: Option<String>,
    /// Restrict history to one device.
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_lookback")]
    pub lookback: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Location updates closer together than this trigger no pass.
    #[serde(default = "default_min_interval")]
    pub min_interval: String,
    #[serde(default)]
    pub min_distance_m: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            page_size: default_page_size(),
            queue_depth: default_queue_depth(),
            min_interval: default_min_interval(),
            min_distance_m: 0.0,
        }
    }
}

fn default_lookback() -> String {
    "24h".to_string()
}

fn default_min_interval() -> String {
    "0s".to_string()
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_settings_path")]
    pub path: PathBuf,
    /// Keep the last sync time across restarts.
    #[serde(default = "default_true")]
    pub persist_last_sync: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
            persist_last_sync: true,
        }
    }
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("track-sync-settings.yaml")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Unset means bit-exact de-duplication.
    #[serde(default)]
    pub dedup_tolerance_deg: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeofenceConfig {
    pub collection_arn: String,
    #[serde(default)]
    pub websocket_url: Option<String>,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tracker.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "tracker.name",
                message: "must not be empty".into(),
            });
        }
        self.lookback()?;
        if self.sync.page_size == 0 || self.sync.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid {
                field: "sync.page_size",
                message: format!("must be between 1 and {}", MAX_PAGE_SIZE),
            });
        }
        self.update_filter()?;
        if let Some(tolerance) = self.map.dedup_tolerance_deg {
            if !(tolerance.is_finite() && tolerance >= 0.0) {
                return Err(ConfigError::Invalid {
                    field: "map.dedup_tolerance_deg",
                    message: "must be a non-negative number".into(),
                });
            }
        }
        if let Some(geofence) = &self.geofence {
            if collection_name_from_arn(&geofence.collection_arn).is_none() {
                return Err(ConfigError::Invalid {
                    field: "geofence.collection_arn",
                    message: format!("no collection name in {}", geofence.collection_arn),
                });
            }
        }
        Ok(())
    }

    pub fn lookback(&self) -> Result<chrono::Duration, ConfigError> {
        parse_duration("sync.lookback", &self.sync.lookback)
    }

    pub fn update_filter(&self) -> Result<UpdateFilter, ConfigError> {
        let min_distance_m = self.sync.min_distance_m;
        if !(min_distance_m.is_finite() && min_distance_m >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "sync.min_distance_m",
                message: "must be a non-negative number".into(),
            });
        }
        Ok(UpdateFilter {
            min_interval: parse_duration("sync.min_interval", &self.sync.min_interval)?,
            min_distance_m,
        })
    }

    pub fn dedup_policy(&self) -> DedupPolicy {
        match self.map.dedup_tolerance_deg {
            Some(deg) => DedupPolicy::Tolerance(deg),
            None => DedupPolicy::Exact,
        }
    }
}

fn parse_duration(field: &'static str, s: &str) -> Result<chrono::Duration, ConfigError> {
    let to_err = |message: String| ConfigError::Duration { field, message };
    let parsed: Duration =
        humantime::parse_duration(s.trim()).map_err(|e| to_err(e.to_string()))?;
    chrono::Duration::from_std(parsed).map_err(|e| to_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_str("tracker:\n  name: demo\n").unwrap();
        assert_eq!(config.tracker.name, "demo");
        assert_eq!(config.lookback().unwrap(), chrono::Duration::hours(24));
        assert_eq!(config.sync.page_size, MAX_PAGE_SIZE);
        assert!(config.settings.persist_last_sync);
        assert_eq!(config.dedup_policy(), DedupPolicy::Exact);
        assert_eq!(config.update_filter().unwrap(), UpdateFilter::default());
        assert!(config.geofence.is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
tracker:
  name: demo
  region: us-east-1
  identity_pool_id: "us-east-1:abc"
sync:
  lookback: 2h 30m
  page_size: 25
  min_interval: 30s
  min_distance_m: 30
settings:
  path: /tmp/settings.yaml
  persist_last_sync: false
map:
  dedup_tolerance_deg: 0.00001
geofence:
  collection_arn: "arn:aws:geo:us-east-1:123:geofence-collection/Fences"
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(
            config.lookback().unwrap(),
            chrono::Duration::minutes(150)
        );
        assert_eq!(config.sync.page_size, 25);
        assert!(!config.settings.persist_last_sync);
        assert_eq!(config.dedup_policy(), DedupPolicy::Tolerance(0.00001));
        assert_eq!(
            config.update_filter().unwrap(),
            UpdateFilter {
                min_interval: chrono::Duration::seconds(30),
                min_distance_m: 30.0,
            }
        );
    }

    #[test]
    fn test_rejects_bad_update_filter() {
        let err = Config::from_str("tracker:\n  name: demo\nsync:\n  min_interval: often\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Duration { field: "sync.min_interval", .. }));

        let err = Config::from_str("tracker:\n  name: demo\nsync:\n  min_distance_m: -5\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "sync.min_distance_m", .. }));
    }

    #[test]
    fn test_rejects_bad_lookback() {
        let err = Config::from_str("tracker:\n  name: demo\nsync:\n  lookback: soon\n").unwrap_err();
        assert!(matches!(err, ConfigError::Duration { .. }));
    }

    #[test]
    fn test_rejects_oversized_page() {
        let err =
            Config::from_str("tracker:\n  name: demo\nsync:\n  page_size: 500\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "sync.page_size", .. }));
    }

    #[test]
    fn test_rejects_bad_arn() {
        let yaml = "tracker:\n  name: demo\ngeofence:\n  collection_arn: nope\n";
        assert!(matches!(
            Config::from_str(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_missing_tracker_is_yaml_error() {
        assert!(matches!(Config::from_str("sync: {}\n"), Err(ConfigError::Yaml(_))));
    }
}
