/// Configuration management for puente

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::host::HostDescription;
use crate::utils;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Client connection configuration
    pub client: ClientConfig,
    /// Load-balancing configuration
    pub load_balancing: LoadBalancingConfig,
    /// Cluster endpoint discovery configuration
    pub discovery: DiscoveryConfig,
    /// Telemetry configuration
    pub metrics: MetricsConfig,
}

/// Client connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Initial endpoints, e.g. `tcp://db1.internal:8529`
    pub endpoints: Vec<String>,
    /// Per-request timeout in milliseconds; also advertised to the
    /// server as the queue-time budget
    pub timeout_ms: u64,
    /// Initial bearer token (rotatable at runtime)
    pub jwt: Option<String>,
}

/// Load-balancing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancingConfig {
    pub strategy: LoadBalancingStrategy,
}

/// Host selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancingStrategy {
    /// Fixed preferred host, walk the list only on failure
    #[serde(rename = "none")]
    None,
    /// One random host kept until it fails
    #[serde(rename = "one_random")]
    OneRandom,
    /// Rotate through all hosts
    #[serde(rename = "round_robin")]
    RoundRobin,
}

/// Cluster endpoint discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Ask the cluster for its coordinator list and keep it refreshed
    pub acquire_host_list: bool,
    /// Refresh period in milliseconds
    pub interval_ms: u64,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Capacity of the queue-time sample ring
    pub response_queue_time_samples: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig {
                endpoints: vec!["tcp://127.0.0.1:8529".to_string()],
                timeout_ms: 120_000,
                jwt: None,
            },
            load_balancing: LoadBalancingConfig {
                strategy: LoadBalancingStrategy::None,
            },
            discovery: DiscoveryConfig {
                acquire_host_list: false,
                interval_ms: 60_000,
            },
            metrics: MetricsConfig {
                response_queue_time_samples: 10,
            },
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.endpoints.is_empty() {
            return Err(ConfigError::ValidationError(
                "endpoints cannot be empty".to_string(),
            ));
        }

        for endpoint in &self.client.endpoints {
            utils::parse_endpoint(endpoint).map_err(|e| {
                ConfigError::ValidationError(format!("invalid endpoint {endpoint:?}: {e}"))
            })?;
        }

        if self.client.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.discovery.acquire_host_list && self.discovery.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "discovery interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.metrics.response_queue_time_samples == 0 {
            return Err(ConfigError::ValidationError(
                "response_queue_time_samples must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed endpoint descriptions, in configuration order
    pub fn host_descriptions(&self) -> Result<Vec<HostDescription>, ConfigError> {
        self.client
            .endpoints
            .iter()
            .map(|endpoint| {
                utils::parse_endpoint(endpoint).map_err(|e| {
                    ConfigError::ValidationError(format!("invalid endpoint {endpoint:?}: {e}"))
                })
            })
            .collect()
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.client.timeout_ms)
    }

    /// Endpoint discovery refresh period
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery.interval_ms)
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let config = Config {
            client: ClientConfig {
                endpoints: vec![
                    "tcp://10.0.1.10:8529".to_string(),
                    "tcp://10.0.1.11:8529".to_string(),
                    "tcp://10.0.1.12:8529".to_string(),
                ],
                timeout_ms: 120_000,
                jwt: None,
            },
            load_balancing: LoadBalancingConfig {
                strategy: LoadBalancingStrategy::RoundRobin,
            },
            discovery: DiscoveryConfig {
                acquire_host_list: true,
                interval_ms: 60_000,
            },
            ..Default::default()
        };

        config.save_to_file(path)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.load_balancing.strategy, LoadBalancingStrategy::None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.client.endpoints = vec![];
        assert!(config.validate().is_err());

        config.client.endpoints = vec!["tcp://db1.internal:8529".to_string()];
        assert!(config.validate().is_ok());

        config.client.timeout_ms = 0;
        assert!(config.validate().is_err());
        config.client.timeout_ms = 30_000;

        config.metrics.response_queue_time_samples = 0;
        assert!(config.validate().is_err());
        config.metrics.response_queue_time_samples = 10;

        config.discovery.acquire_host_list = true;
        config.discovery.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_bad_endpoint() {
        let mut config = Config::default();
        config.client.endpoints = vec!["unix:///tmp/db.sock".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_host_descriptions_follow_configuration_order() {
        let mut config = Config::default();
        config.client.endpoints = vec![
            "tcp://db1.internal:8529".to_string(),
            "ssl://db2.internal:8530".to_string(),
        ];

        let descriptions = config.host_descriptions().unwrap();
        assert_eq!(descriptions[0], HostDescription::new("db1.internal", 8529));
        assert_eq!(descriptions[1], HostDescription::new("db2.internal", 8530));
    }

    #[test]
    fn test_strategy_names() {
        let parsed: Config = toml::from_str(
            r#"
            [client]
            endpoints = ["tcp://127.0.0.1:8529"]
            timeout_ms = 30000

            [load_balancing]
            strategy = "round_robin"

            [discovery]
            acquire_host_list = true
            interval_ms = 10000

            [metrics]
            response_queue_time_samples = 9
            "#,
        )
        .unwrap();

        assert_eq!(
            parsed.load_balancing.strategy,
            LoadBalancingStrategy::RoundRobin
        );
        assert_eq!(parsed.metrics.response_queue_time_samples, 9);
        assert_eq!(parsed.discovery_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed_config: Config = toml::from_str(&toml_str).unwrap();
        assert!(parsed_config.validate().is_ok());
    }

    #[test]
    fn test_config_file_operations() {
        let config = Config::default();
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();
        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert!(loaded_config.validate().is_ok());
    }

    #[test]
    fn test_example_config_is_valid() {
        let temp_file = NamedTempFile::new().unwrap();

        Config::create_example_config(temp_file.path()).unwrap();
        let loaded = Config::load_from_file(temp_file.path()).unwrap();
        assert!(loaded.discovery.acquire_host_list);
        assert_eq!(loaded.client.endpoints.len(), 3);
    }
}
