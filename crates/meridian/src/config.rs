//! Configuration management for the Meridian server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use meridian_core::{AggregationSettings, BoundingBox, GeoPoint};
use meridian_node::{BotConfig, ClusterConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Spatial aggregation tunables
    #[serde(default)]
    pub aggregation: AggregationConfig,
    /// Cluster shape
    #[serde(default)]
    pub cluster: ClusterSettings,
    /// Simulated users
    #[serde(default)]
    pub bots: BotSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Aggregation settings as written in the config file, intervals in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub max_zoom_depth: u8,
    pub max_subscription_regions: usize,
    pub cluster_threshold: usize,
    pub cluster_dimension: usize,
    pub summary_interval_ms: u64,
    pub expiry_interval_ms: u64,
    pub subscriber_batch_interval_ms: u64,
    pub mailbox_capacity: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        let defaults = AggregationSettings::default();
        Self {
            max_zoom_depth: defaults.max_zoom_depth,
            max_subscription_regions: defaults.max_subscription_regions,
            cluster_threshold: defaults.cluster_threshold,
            cluster_dimension: defaults.cluster_dimension,
            summary_interval_ms: defaults.summary_interval.as_millis() as u64,
            expiry_interval_ms: defaults.expiry_interval.as_millis() as u64,
            subscriber_batch_interval_ms: defaults.subscriber_batch_interval.as_millis() as u64,
            mailbox_capacity: defaults.mailbox_capacity,
        }
    }
}

/// Cluster configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Number of in-process nodes, each owning one region manager
    pub nodes: usize,
    /// Virtual nodes per node on the consistent-hash ring
    pub virtual_nodes: usize,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            nodes: 3,
            virtual_nodes: 150,
        }
    }
}

/// Bot simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    pub enabled: bool,
    pub total: usize,
    pub step_interval_ms: u64,
    pub speed_degrees: f64,
    /// Steps between viewport changes, 0 to never subscribe
    pub viewport_every: u32,
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Default for BotSettings {
    fn default() -> Self {
        let defaults = BotConfig::default();
        Self {
            enabled: true,
            total: defaults.total,
            step_interval_ms: defaults.step_interval.as_millis() as u64,
            speed_degrees: defaults.speed_degrees,
            viewport_every: defaults.viewport_every,
            south: defaults.area.south_west.lat,
            west: defaults.area.south_west.lng,
            north: defaults.area.north_east.lat,
            east: defaults.area.north_east.lng,
        }
    }
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    pub file_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file_path: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn to_aggregation_settings(&self) -> AggregationSettings {
        let a = &self.aggregation;
        AggregationSettings {
            max_zoom_depth: a.max_zoom_depth,
            max_subscription_regions: a.max_subscription_regions,
            cluster_threshold: a.cluster_threshold,
            cluster_dimension: a.cluster_dimension,
            summary_interval: Duration::from_millis(a.summary_interval_ms),
            expiry_interval: Duration::from_millis(a.expiry_interval_ms),
            subscriber_batch_interval: Duration::from_millis(a.subscriber_batch_interval_ms),
            mailbox_capacity: a.mailbox_capacity,
        }
    }

    pub fn to_cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            nodes: self.cluster.nodes,
            virtual_nodes: self.cluster.virtual_nodes,
            aggregation: self.to_aggregation_settings(),
        }
    }

    pub fn to_bot_config(&self) -> BotConfig {
        let b = &self.bots;
        BotConfig {
            total: b.total,
            step_interval: Duration::from_millis(b.step_interval_ms),
            speed_degrees: b.speed_degrees,
            area: BoundingBox::new(GeoPoint::new(b.south, b.west), GeoPoint::new(b.north, b.east)),
            viewport_every: b.viewport_every,
        }
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        self.to_cluster_config().validate().map_err(|e| e.to_string())?;

        if self.bots.enabled {
            self.to_bot_config().validate().map_err(|e| e.to_string())?;
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.aggregation.max_zoom_depth, 16);
        assert_eq!(config.aggregation.max_subscription_regions, 20);
        assert_eq!(config.aggregation.cluster_threshold, 16);
        assert_eq!(config.aggregation.cluster_dimension, 4);
        assert_eq!(config.aggregation.summary_interval_ms, 2000);
        assert_eq!(config.aggregation.expiry_interval_ms, 30000);
        assert_eq!(config.aggregation.subscriber_batch_interval_ms, 2000);

        assert_eq!(config.cluster.nodes, 3);
        assert_eq!(config.cluster.virtual_nodes, 150);
        assert!(config.bots.enabled);

        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.logging.file_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_conversion_round_trips_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.to_aggregation_settings(), AggregationSettings::default());
        assert_eq!(config.to_bot_config(), BotConfig::default());

        let cluster = config.to_cluster_config();
        assert_eq!(cluster.nodes, 3);
        assert_eq!(cluster.aggregation.expiry_interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meridian.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.cluster.nodes, 3);
        assert!(path.exists());

        // The written file loads back to the same settings.
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.to_cluster_config(), config.to_cluster_config());
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[aggregation]
max_zoom_depth = 12
summary_interval_ms = 500

[cluster]
nodes = 5

[bots]
enabled = false

[logging]
level = "debug"
json_format = true
file_path = "/tmp/meridian.log"
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&temp_file.path().to_path_buf()).await.unwrap();

        assert_eq!(config.aggregation.max_zoom_depth, 12);
        assert_eq!(config.aggregation.summary_interval_ms, 500);
        // Unset fields keep their defaults.
        assert_eq!(config.aggregation.expiry_interval_ms, 30000);
        assert_eq!(config.cluster.nodes, 5);
        assert_eq!(config.cluster.virtual_nodes, 150);
        assert!(!config.bots.enabled);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.logging.file_path.as_deref(), Some("/tmp/meridian.log"));
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[cluster\nnodes = ").await.unwrap();
        assert!(AppConfig::load_from_file(&temp_file.path().to_path_buf()).await.is_err());
    }

    #[test]
    fn test_validation_invalid_values() {
        let mut config = AppConfig::default();
        config.aggregation.max_zoom_depth = 40;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cluster.nodes = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.aggregation.summary_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bot_area_only_checked_when_enabled() {
        let mut config = AppConfig::default();
        config.bots.south = 50.0;
        config.bots.north = 40.0;
        assert!(config.validate().is_err());

        config.bots.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_valid_log_levels() {
        let mut config = AppConfig::default();
        for level in ["trace", "debug", "info", "warn", "error"] {
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "level {level} should be valid");
        }
    }
}
