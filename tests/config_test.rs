//! Configuration loading from YAML files

use serial_test::serial;
use solargrid_monitor::{config::Config, models::Granularity, AppError};

fn write_config(name: &str, content: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "solargrid-monitor-{}-{}.yaml",
        name,
        std::process::id()
    ));
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_config_loading_from_yaml() {
    let path = write_config(
        "full",
        r#"
api:
  base_url: "https://grid.example.com/"
device:
  location: "roof-east"
polling:
  live_interval_ms: 4000
  retry_network_errors: true
  pause_in_background: false
panels:
  panel_volts: 24.0
history:
  granularity: week
  max_points: 12
"#,
    );

    let config = Config::load(&path).unwrap();

    assert_eq!(config.api.base_url, "https://grid.example.com/");
    assert_eq!(config.polling.live_interval_ms, 4000);
    assert_eq!(config.polling.history_interval_ms, 60_000);
    assert!(config.polling.retry_network_errors);
    assert!(!config.polling.pause_in_background);
    assert_eq!(config.panels.panel_volts, 24.0);
    assert_eq!(config.panels.total_volts, 88.0);
    assert_eq!(config.history.granularity, Granularity::Week);
    assert_eq!(config.history.max_points, 12);
    assert!(config.auth.token_path().is_none());

    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn test_config_env_var_substitution() {
    std::env::set_var("SOLARGRID_TEST_TOKEN", "env-token");
    std::env::set_var("SOLARGRID_TEST_DEVICE", "INV-042");

    let path = write_config(
        "env",
        r#"
api:
  base_url: "https://grid.example.com"
auth:
  access_token: "$(SOLARGRID_TEST_TOKEN)"
device:
  device_id: "$(SOLARGRID_TEST_DEVICE)"
"#,
    );

    let config = Config::load(&path).unwrap();
    assert_eq!(config.auth.access_token.as_deref(), Some("env-token"));
    assert_eq!(config.device.device_id.as_deref(), Some("INV-042"));

    std::env::remove_var("SOLARGRID_TEST_TOKEN");
    let config = Config::load(&path).unwrap();
    assert_eq!(config.auth.access_token, None);

    std::fs::remove_file(&path).ok();
    std::env::remove_var("SOLARGRID_TEST_DEVICE");
}

#[test]
#[serial]
fn test_token_file_tilde_expanded() {
    let config = Config::from_yaml(
        r#"
api:
  base_url: "https://grid.example.com"
auth:
  token_file: "~/solargrid/token.json"
device:
  device_id: "INV-001"
"#,
    )
    .unwrap();

    let path = config.auth.token_path().unwrap();
    assert!(!path.to_string_lossy().starts_with('~'));
    assert!(path.ends_with("solargrid/token.json"));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = Config::load("/nonexistent/solargrid-monitor.yaml").unwrap_err();
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn test_zero_max_points_rejected() {
    let err = Config::from_yaml(
        r#"
api:
  base_url: "https://grid.example.com"
device:
  device_id: "INV-001"
history:
  max_points: 0
"#,
    )
    .unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn test_bundled_config_parses() {
    let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/config.yaml")).unwrap();
    assert_eq!(config.polling.live_interval_ms, 2_000);
    assert_eq!(config.status.low_battery_soc, 20.0);
}
