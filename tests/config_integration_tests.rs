// Configuration system integration tests

use homewizard_recorder::config::{load_config, ConfigLoader, RecorderConfig, StorageSelection};
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    fs::write(&path, content).expect("Failed to write temp config");
    path
}

#[test]
fn test_load_default_config() {
    // The shipped config parses; devices come from the environment at runtime
    let config = ConfigLoader::load("config/default.yaml");
    assert!(config.is_ok(), "Failed to parse default config: {:?}", config.err());

    let config = config.unwrap();
    assert!(config.devices.is_empty());
    assert_eq!(config.polling.request_timeout_seconds, 5);
    assert_eq!(config.logging.level, "info");
    let influx = config.storage.influxdb.as_ref().unwrap();
    assert_eq!(influx.excluded_fields, vec!["wifi_ssid"]);
}

#[test]
fn test_config_with_env_vars() {
    let temp_config = r#"
devices:
  - 10.0.0.5
  - ${HW_CONFIG_TEST_DEVICE:-10.0.0.6}

polling:
  interval_ms: ${HW_CONFIG_TEST_INTERVAL:-5000}

storage:
  filesystem:
    base_path: ${HW_CONFIG_TEST_PATH:-/data}

logging:
  level: debug
"#;

    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, temp_config);

    std::env::set_var("HW_CONFIG_TEST_INTERVAL", "2500");
    std::env::set_var("HW_CONFIG_TEST_PATH", "/srv/homewizard");

    let result = load_config(&path);
    assert!(result.is_ok(), "Failed to load config with env vars: {:?}", result.err());

    let config = result.unwrap();
    assert_eq!(config.devices, vec!["10.0.0.5", "10.0.0.6"]);
    assert_eq!(config.polling.interval_ms, 2500);
    assert_eq!(config.logging.level, "debug");

    match config.storage.selection().unwrap() {
        StorageSelection::Filesystem(fs) => assert_eq!(fs.base_path, "/srv/homewizard"),
        other => panic!("Expected filesystem storage, got {:?}", other),
    }

    std::env::remove_var("HW_CONFIG_TEST_INTERVAL");
    std::env::remove_var("HW_CONFIG_TEST_PATH");
}

#[test]
fn test_influxdb_config_from_file() {
    let temp_config = r#"
devices: [p1meter.local]

storage:
  influxdb:
    url: http://influx:8086
    token: secret
    org: home
    bucket: energy
    error_bucket: energy_errors
  filesystem:
    base_path: /data
"#;

    let dir = TempDir::new().unwrap();
    let config = load_config(write_config(&dir, temp_config)).unwrap();

    match config.storage.selection().unwrap() {
        StorageSelection::InfluxDb(influx) => {
            assert_eq!(influx.bucket, "energy");
            assert_eq!(influx.error_bucket(), "energy_errors");
            assert_eq!(influx.max_retries, 2);
            assert_eq!(influx.timeout_seconds, 10);
        }
        other => panic!("Expected InfluxDB storage, got {:?}", other),
    }
}

#[test]
fn test_config_without_storage_is_rejected() {
    let temp_config = r#"
devices: [10.0.0.5]
polling:
  interval_ms: 1000
"#;

    let dir = TempDir::new().unwrap();
    let result = load_config(write_config(&dir, temp_config));

    assert!(result.is_err());
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("Storage backend not configured"), "{}", message);
}

#[test]
fn test_config_without_devices_is_rejected() {
    let temp_config = r#"
storage:
  filesystem:
    base_path: /data
"#;

    let dir = TempDir::new().unwrap();
    let result = load_config(write_config(&dir, temp_config));
    assert!(result.is_err());
}

#[test]
fn test_invalid_yaml() {
    let dir = TempDir::new().unwrap();
    let result = load_config(write_config(&dir, "devices: [unclosed"));
    assert!(result.is_err());
}

#[test]
fn test_env_only_configuration() {
    let mut config = RecorderConfig::default();
    ConfigLoader::apply_env_overrides(&mut config, |key| match key {
        "DEVICES" => Some("10.0.0.5, 10.0.0.9".to_string()),
        "DATA_PATH" => Some("/data".to_string()),
        _ => None,
    })
    .unwrap();

    assert!(ConfigLoader::validate(&config).is_ok());
    assert_eq!(config.devices.len(), 2);
    assert_eq!(config.polling.interval_ms, 5000);
}
