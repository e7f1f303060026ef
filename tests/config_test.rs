//! Integration tests for configuration loading

use parking_bay::infra::{Config, HardwareMode, NotifyMode};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_config_from_file() {
    let temp_file = write_config(
        r#"
[site]
id = "lot-b"

[bay]
slots = 5
price_per_minute_cents = 75
currency = "EUR "
history_len = 20

[entry]
threshold_cm = 20.0
no_car_grace_ms = 3000

[slots]
debounce_ms = 100
exit_grace_ms = 1500
ir_active_low = false

[gate]
open_duty = 95
actuation_ms = 250

[hardware]
mode = "sim"
device = "/dev/ttyACM0"
baud = 57600

[status]
port = 9090
metrics_log_secs = 0

[notify]
mode = "mqtt"
mqtt_host = "broker.local"
mqtt_topic = "lot-b/tickets"
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "lot-b");
    assert_eq!(config.slot_count(), 5);
    assert_eq!(config.price_per_minute_cents(), 75);
    assert_eq!(config.currency(), "EUR ");
    assert_eq!(config.history_len(), 20);
    assert_eq!(config.entry_threshold_cm(), 20.0);
    assert_eq!(config.no_car_grace_ms(), 3000);
    assert_eq!(config.debounce_ms(), 100);
    assert_eq!(config.exit_grace_ms(), 1500);
    assert!(!config.ir_active_low());
    assert_eq!(config.gate_open_duty(), 95);
    assert_eq!(config.gate_actuation_ms(), 250);
    assert_eq!(config.hardware_mode(), HardwareMode::Sim);
    assert_eq!(config.serial_device(), "/dev/ttyACM0");
    assert_eq!(config.serial_baud(), 57600);
    assert_eq!(config.status_port(), 9090);
    assert_eq!(config.metrics_log_secs(), 0);
    assert_eq!(config.notify_mode(), NotifyMode::Mqtt);
    assert_eq!(config.mqtt_host(), "broker.local");
    assert_eq!(config.mqtt_topic(), "lot-b/tickets");
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/bay.toml");
    assert_eq!(config.slot_count(), 3);
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_invalid_file_falls_back_but_from_file_errors() {
    let temp_file = write_config("[bay]\nslots = 0\n");

    assert!(Config::from_file(temp_file.path()).is_err());
    let config = Config::load_from_path(temp_file.path());
    assert_eq!(config.slot_count(), 3);
}

#[test]
fn test_malformed_toml_is_an_error() {
    let temp_file = write_config("[bay\nslots = 3\n");
    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_partial_sections_keep_defaults() {
    let temp_file = write_config("[gate]\nclosed_duty = 35\n");

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.gate_closed_duty(), 35);
    assert_eq!(config.gate_open_duty(), 90);
    assert_eq!(config.price_per_minute_cents(), 50);
    assert_eq!(config.notify_queue_len(), 32);
    assert!(config.status_enabled());
}

#[test]
fn test_shipped_configs_parse() {
    let root = env!("CARGO_MANIFEST_DIR");
    let bay = Config::from_file(format!("{root}/config/bay.toml")).unwrap();
    assert_eq!(bay.hardware_mode(), HardwareMode::Serial);
    let sim = Config::from_file(format!("{root}/config/sim.toml")).unwrap();
    assert_eq!(sim.hardware_mode(), HardwareMode::Sim);
}
