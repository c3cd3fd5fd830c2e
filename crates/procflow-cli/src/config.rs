//! Configuration file support for procflow
//!
//! Supports YAML and TOML configuration files.

use procflow_runtime::{Capacity, MinerConfig, RouterConfig, SoftConfig, TemporalConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-case Heuristics Miner parameters
    pub miner: MinerSection,

    /// Object-type routing and AER inference
    pub object_centric: ObjectCentricConfig,

    /// Behavioral conformance (reference model and case cache)
    pub conformance: ConformanceConfig,

    pub soft_conformance: SoftConfig,

    pub temporal: TemporalConfig,

    /// Prometheus endpoint
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format: text or json
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Heuristics Miner parameters.
///
/// `budget`, when set, replaces the error bound `epsilon` with a fixed
/// entry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerSection {
    pub epsilon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<usize>,
    pub dependency_threshold: f64,
    pub and_threshold: f64,
    pub update_every: u64,
}

impl Default for MinerSection {
    fn default() -> Self {
        let defaults = MinerConfig::default();
        Self {
            epsilon: 0.01,
            budget: None,
            dependency_threshold: defaults.dependency_threshold,
            and_threshold: defaults.and_threshold,
            update_every: defaults.update_every,
        }
    }
}

impl MinerSection {
    pub fn to_miner_config(&self) -> MinerConfig {
        let capacity = match self.budget {
            Some(budget) => Capacity::Budget(budget),
            None => Capacity::Epsilon(self.epsilon),
        };
        MinerConfig {
            capacity,
            dependency_threshold: self.dependency_threshold,
            and_threshold: self.and_threshold,
            update_every: self.update_every,
        }
    }
}

/// Object-centric mining parameters.
///
/// An empty `control_flow` list mines every object type seen on the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectCentricConfig {
    pub object_epsilon: f64,
    pub object_emit_threshold: f64,
    pub aer_epsilon: f64,
    pub aer_update_every: u64,
    pub control_flow: Vec<String>,
}

impl Default for ObjectCentricConfig {
    fn default() -> Self {
        let defaults = RouterConfig::default();
        Self {
            object_epsilon: defaults.object_epsilon,
            object_emit_threshold: defaults.object_emit_threshold,
            aer_epsilon: defaults.aer_epsilon,
            aer_update_every: defaults.aer_update_every,
            control_flow: Vec::new(),
        }
    }
}

impl ObjectCentricConfig {
    pub fn to_router_config(&self, miner: &MinerSection) -> RouterConfig {
        RouterConfig {
            object_epsilon: self.object_epsilon,
            object_emit_threshold: self.object_emit_threshold,
            aer_epsilon: self.aer_epsilon,
            aer_update_every: self.aer_update_every,
            miner: miner.to_miner_config(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConformanceConfig {
    /// Longest path explored when computing `P` and `F`
    pub max_path_depth: usize,

    /// Cases kept in the LRU cache
    pub max_cases: usize,
}

impl Default for ConformanceConfig {
    fn default() -> Self {
        Self {
            max_path_depth: 10,
            max_cases: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from a file (auto-detects format from extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => Self::from_yaml(&content).or_else(|_| Self::from_toml(&content)),
        }
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Merge another config into this one (other takes precedence for
    /// values that differ from the defaults)
    pub fn merge(&mut self, other: Config) {
        let logging = LoggingConfig::default();
        if other.logging.level != logging.level {
            self.logging.level = other.logging.level;
        }
        if other.logging.format != logging.format {
            self.logging.format = other.logging.format;
        }

        let miner = MinerSection::default();
        if other.miner.epsilon != miner.epsilon {
            self.miner.epsilon = other.miner.epsilon;
        }
        if other.miner.budget.is_some() {
            self.miner.budget = other.miner.budget;
        }
        if other.miner.dependency_threshold != miner.dependency_threshold {
            self.miner.dependency_threshold = other.miner.dependency_threshold;
        }
        if other.miner.and_threshold != miner.and_threshold {
            self.miner.and_threshold = other.miner.and_threshold;
        }
        if other.miner.update_every != miner.update_every {
            self.miner.update_every = other.miner.update_every;
        }

        let object_centric = ObjectCentricConfig::default();
        if other.object_centric.object_epsilon != object_centric.object_epsilon {
            self.object_centric.object_epsilon = other.object_centric.object_epsilon;
        }
        if other.object_centric.object_emit_threshold != object_centric.object_emit_threshold {
            self.object_centric.object_emit_threshold = other.object_centric.object_emit_threshold;
        }
        if other.object_centric.aer_epsilon != object_centric.aer_epsilon {
            self.object_centric.aer_epsilon = other.object_centric.aer_epsilon;
        }
        if other.object_centric.aer_update_every != object_centric.aer_update_every {
            self.object_centric.aer_update_every = other.object_centric.aer_update_every;
        }
        if !other.object_centric.control_flow.is_empty() {
            self.object_centric.control_flow = other.object_centric.control_flow;
        }

        let conformance = ConformanceConfig::default();
        if other.conformance.max_path_depth != conformance.max_path_depth {
            self.conformance.max_path_depth = other.conformance.max_path_depth;
        }
        if other.conformance.max_cases != conformance.max_cases {
            self.conformance.max_cases = other.conformance.max_cases;
        }

        let soft = SoftConfig::default();
        if other.soft_conformance.alpha != soft.alpha {
            self.soft_conformance.alpha = other.soft_conformance.alpha;
        }
        if other.soft_conformance.max_cases_to_store != soft.max_cases_to_store {
            self.soft_conformance.max_cases_to_store = other.soft_conformance.max_cases_to_store;
        }
        if other.soft_conformance.results_refresh_rate != soft.results_refresh_rate {
            self.soft_conformance.results_refresh_rate =
                other.soft_conformance.results_refresh_rate;
        }

        let temporal = TemporalConfig::default();
        if other.temporal.zeta != temporal.zeta {
            self.temporal.zeta = other.temporal.zeta;
        }
        if other.temporal.max_cases != temporal.max_cases {
            self.temporal.max_cases = other.temporal.max_cases;
        }
        if other.temporal.max_history != temporal.max_history {
            self.temporal.max_history = other.temporal.max_history;
        }

        if other.metrics.enabled {
            self.metrics.enabled = true;
        }
        if other.metrics.port != MetricsConfig::default().port {
            self.metrics.port = other.metrics.port;
        }
    }

    /// Create an example configuration
    pub fn example() -> Self {
        Config {
            logging: LoggingConfig::default(),
            miner: MinerSection {
                epsilon: 0.001,
                update_every: 100,
                ..MinerSection::default()
            },
            object_centric: ObjectCentricConfig {
                object_emit_threshold: 0.05,
                aer_update_every: 100,
                control_flow: vec!["Order".to_string(), "Item".to_string()],
                ..ObjectCentricConfig::default()
            },
            conformance: ConformanceConfig::default(),
            soft_conformance: SoftConfig {
                results_refresh_rate: 100,
                ..SoftConfig::default()
            },
            temporal: TemporalConfig::default(),
            metrics: MetricsConfig {
                enabled: true,
                port: 9090,
            },
        }
    }

    /// Generate example YAML configuration
    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::example()).unwrap_or_default()
    }

    /// Generate example TOML configuration
    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::example()).unwrap_or_default()
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    IoError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.miner.to_miner_config(), MinerConfig::default());
        assert!(config.object_centric.control_flow.is_empty());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
logging:
  level: debug
  format: json
miner:
  budget: 500
  update_every: 10
object_centric:
  control_flow: [Order, Item]
soft_conformance:
  alpha: 0.5
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.miner.to_miner_config().capacity, Capacity::Budget(500));
        assert_eq!(config.miner.update_every, 10);
        assert_eq!(config.object_centric.control_flow, vec!["Order", "Item"]);
        assert_eq!(config.soft_conformance.alpha, 0.5);
        assert_eq!(config.soft_conformance.max_cases_to_store, 10_000);
    }

    #[test]
    fn test_toml_config() {
        let toml = r#"
[miner]
epsilon = 0.05
dependency_threshold = 0.8

[temporal]
zeta = 3.0

[metrics]
enabled = true
port = 9999
"#;
        let config = Config::from_toml(toml).unwrap();
        let miner = config.miner.to_miner_config();
        assert_eq!(miner.capacity, Capacity::Epsilon(0.05));
        assert_eq!(miner.dependency_threshold, 0.8);
        assert_eq!(config.temporal.zeta, 3.0);
        assert_eq!(config.temporal.max_cases, 10_000);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9999);
    }

    #[test]
    fn test_merge_config() {
        let mut base = Config::default();
        base.miner.update_every = 50;
        let other = Config {
            miner: MinerSection {
                budget: Some(64),
                ..MinerSection::default()
            },
            conformance: ConformanceConfig {
                max_path_depth: 4,
                ..ConformanceConfig::default()
            },
            ..Config::default()
        };

        base.merge(other);
        assert_eq!(base.miner.budget, Some(64));
        assert_eq!(base.miner.update_every, 50);
        assert_eq!(base.conformance.max_path_depth, 4);
        assert_eq!(base.conformance.max_cases, 10_000);
    }

    #[test]
    fn test_router_config_uses_miner_section() {
        let config = Config::example();
        let router = config.object_centric.to_router_config(&config.miner);
        assert_eq!(router.object_emit_threshold, 0.05);
        assert_eq!(router.miner.update_every, 100);
        assert!(router.validate().is_ok());
    }
}
