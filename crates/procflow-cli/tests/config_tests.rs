//! Tests for procflow-cli configuration loading.
//!
//! Exercises config parsing (YAML, TOML), defaults, merge behavior, example
//! generation and error handling.

use procflow_cli::config::*;
use procflow_runtime::Capacity;
use std::io::Write;
use std::path::PathBuf;

// =============================================================================
// Config defaults
// =============================================================================

#[test]
fn config_default_logging() {
    let cfg = Config::default();
    assert_eq!(cfg.logging.level, "info");
    assert_eq!(cfg.logging.format, "text");
}

#[test]
fn config_default_miner_uses_epsilon() {
    let cfg = Config::default();
    assert_eq!(cfg.miner.budget, None);
    assert_eq!(
        cfg.miner.to_miner_config().capacity,
        Capacity::Epsilon(cfg.miner.epsilon)
    );
}

#[test]
fn config_default_conformance() {
    let cfg = Config::default();
    assert_eq!(cfg.conformance.max_path_depth, 10);
    assert_eq!(cfg.conformance.max_cases, 10_000);
    assert_eq!(cfg.temporal.zeta, 6.0);
}

#[test]
fn config_default_metrics_disabled() {
    let cfg = Config::default();
    assert!(!cfg.metrics.enabled);
    assert_eq!(cfg.metrics.port, 9090);
}

// =============================================================================
// Parsing
// =============================================================================

#[test]
fn config_empty_yaml_is_default() {
    let cfg = Config::from_yaml("{}").unwrap();
    assert_eq!(cfg, Config::default());
}

#[test]
fn config_empty_toml_is_default() {
    let cfg = Config::from_toml("").unwrap();
    assert_eq!(cfg, Config::default());
}

#[test]
fn config_yaml_partial_section_keeps_defaults() {
    let cfg = Config::from_yaml("conformance:\n  max_cases: 12\n").unwrap();
    assert_eq!(cfg.conformance.max_cases, 12);
    assert_eq!(cfg.conformance.max_path_depth, 10);
}

#[test]
fn config_invalid_yaml_is_parse_error() {
    let err = Config::from_yaml("miner: [unclosed").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn config_invalid_toml_is_parse_error() {
    let err = Config::from_toml("[miner\nepsilon = ").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn config_wrong_type_is_parse_error() {
    let err = Config::from_yaml("metrics:\n  port: not-a-port\n").unwrap_err();
    assert!(err.to_string().starts_with("Failed to parse config"));
}

// =============================================================================
// Loading from files
// =============================================================================

#[test]
fn config_load_yaml_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "miner:\n  budget: 32\nlogging:\n  format: json").unwrap();

    let cfg = Config::load(file.path()).unwrap();
    assert_eq!(cfg.miner.budget, Some(32));
    assert_eq!(cfg.logging.format, "json");
}

#[test]
fn config_load_toml_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[object_centric]\ncontrol_flow = [\"Order\"]").unwrap();

    let cfg = Config::load(file.path()).unwrap();
    assert_eq!(cfg.object_centric.control_flow, vec!["Order"]);
}

#[test]
fn config_load_unknown_extension_falls_back_to_toml() {
    let mut file = tempfile::Builder::new().suffix(".conf").tempfile().unwrap();
    writeln!(file, "[temporal]\nzeta = 2.5").unwrap();

    let cfg = Config::load(file.path()).unwrap();
    assert_eq!(cfg.temporal.zeta, 2.5);
}

#[test]
fn config_load_missing_file_is_io_error() {
    let path = PathBuf::from("/nonexistent/procflow.yaml");
    match Config::load(&path) {
        Err(ConfigError::IoError(p, _)) => assert_eq!(p, path),
        other => panic!("expected IoError, got {:?}", other),
    }
}

// =============================================================================
// Merge
// =============================================================================

#[test]
fn config_merge_default_keeps_base() {
    let mut base = Config::example();
    base.merge(Config::default());
    assert_eq!(base, Config::example());
}

#[test]
fn config_merge_overrides_non_default_values() {
    let mut base = Config::default();
    let mut other = Config::default();
    other.logging.level = "debug".to_string();
    other.soft_conformance.alpha = 0.4;
    other.metrics.enabled = true;

    base.merge(other);
    assert_eq!(base.logging.level, "debug");
    assert_eq!(base.soft_conformance.alpha, 0.4);
    assert!(base.metrics.enabled);
}

// =============================================================================
// Examples
// =============================================================================

#[test]
fn config_example_yaml_round_trips() {
    let yaml = Config::example_yaml();
    assert!(yaml.contains("control_flow"));
    assert_eq!(Config::from_yaml(&yaml).unwrap(), Config::example());
}

#[test]
fn config_example_toml_round_trips() {
    let toml = Config::example_toml();
    assert!(toml.contains("[soft_conformance]"));
    assert_eq!(Config::from_toml(&toml).unwrap(), Config::example());
}

#[test]
fn config_example_is_valid_for_runtime() {
    let cfg = Config::example();
    assert!(cfg.miner.to_miner_config().validate().is_ok());
    assert!(cfg
        .object_centric
        .to_router_config(&cfg.miner)
        .validate()
        .is_ok());
}
