//! Configuration loading from TOML files
//!
//! Config file is selected via `--config <path>` (default: config/bay.toml).
//! Every section is optional; missing keys take the defaults below.

use anyhow::{ensure, Context};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Largest bay the identifier type and the status page are sized for
pub const MAX_SLOTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareMode {
    /// Sensor bridge microcontroller on a serial port
    Serial,
    /// In-memory simulated sensors
    Sim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMode {
    Log,
    Telegram,
    Mqtt,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BaySection {
    pub slots: usize,
    pub price_per_minute_cents: u64,
    pub currency: String,
    pub history_len: usize,
    pub tick_ms: u64,
}

impl Default for BaySection {
    fn default() -> Self {
        Self {
            slots: 3,
            price_per_minute_cents: 50,
            currency: "$".to_string(),
            history_len: 10,
            tick_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntrySection {
    pub threshold_cm: f64,
    pub check_interval_ms: u64,
    pub no_car_grace_ms: u64,
}

impl Default for EntrySection {
    fn default() -> Self {
        Self { threshold_cm: 15.0, check_interval_ms: 200, no_car_grace_ms: 2000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlotsSection {
    pub debounce_ms: u64,
    pub exit_grace_ms: u64,
    /// IR output is LOW when a car is present
    pub ir_active_low: bool,
}

impl Default for SlotsSection {
    fn default() -> Self {
        Self { debounce_ms: 150, exit_grace_ms: 1000, ir_active_low: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateSection {
    pub open_duty: u8,
    pub closed_duty: u8,
    /// Time the servo needs to travel after a duty change
    pub actuation_ms: u64,
}

impl Default for GateSection {
    fn default() -> Self {
        Self { open_duty: 90, closed_duty: 40, actuation_ms: 300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HardwareSection {
    pub mode: HardwareMode,
    pub device: String,
    pub baud: u32,
    /// Per-request timeout on the sensor bridge
    pub timeout_ms: u64,
}

impl Default for HardwareSection {
    fn default() -> Self {
        Self {
            mode: HardwareMode::Serial,
            device: "/dev/ttyUSB0".to_string(),
            baud: 115_200,
            timeout_ms: 40,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusSection {
    pub enabled: bool,
    pub port: u16,
    pub request_timeout_ms: u64,
    /// Interval of the periodic metrics log line; 0 disables it
    pub metrics_log_secs: u64,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self { enabled: true, port: 8080, request_timeout_ms: 500, metrics_log_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    pub mode: NotifyMode,
    pub queue_len: usize,
    pub timeout_ms: u64,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_api: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_topic: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            mode: NotifyMode::Log,
            queue_len: 32,
            timeout_ms: 10_000,
            telegram_token: None,
            telegram_chat_id: None,
            telegram_api: "https://api.telegram.org".to_string(),
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_topic: "parking/tickets".to_string(),
            mqtt_username: None,
            mqtt_password: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    /// Unique site identifier, used in logs and MQTT payloads
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub site: SiteSection,
    pub bay: BaySection,
    pub entry: EntrySection,
    pub slots: SlotsSection,
    pub gate: GateSection,
    pub hardware: HardwareSection,
    pub status: StatusSection,
    pub notify: NotifySection,
}

/// Main configuration struct used throughout the application.
///
/// Read once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    slot_count: usize,
    price_per_minute_cents: u64,
    currency: String,
    history_len: usize,
    tick_ms: u64,
    entry_threshold_cm: f64,
    entry_check_interval_ms: u64,
    no_car_grace_ms: u64,
    debounce_ms: u64,
    exit_grace_ms: u64,
    ir_active_low: bool,
    gate_open_duty: u8,
    gate_closed_duty: u8,
    gate_actuation_ms: u64,
    hardware_mode: HardwareMode,
    serial_device: String,
    serial_baud: u32,
    hardware_timeout_ms: u64,
    status_enabled: bool,
    status_port: u16,
    status_request_timeout_ms: u64,
    metrics_log_secs: u64,
    notify_mode: NotifyMode,
    notify_queue_len: usize,
    notify_timeout_ms: u64,
    telegram_token: Option<String>,
    telegram_chat_id: Option<String>,
    telegram_api: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let TomlConfig { site, bay, entry, slots, gate, hardware, status, notify } = toml_config;
        Self {
            site_id: site.id.unwrap_or_else(|| "parking-bay".to_string()),
            slot_count: bay.slots,
            price_per_minute_cents: bay.price_per_minute_cents,
            currency: bay.currency,
            history_len: bay.history_len,
            tick_ms: bay.tick_ms,
            entry_threshold_cm: entry.threshold_cm,
            entry_check_interval_ms: entry.check_interval_ms,
            no_car_grace_ms: entry.no_car_grace_ms,
            debounce_ms: slots.debounce_ms,
            exit_grace_ms: slots.exit_grace_ms,
            ir_active_low: slots.ir_active_low,
            gate_open_duty: gate.open_duty,
            gate_closed_duty: gate.closed_duty,
            gate_actuation_ms: gate.actuation_ms,
            hardware_mode: hardware.mode,
            serial_device: hardware.device,
            serial_baud: hardware.baud,
            hardware_timeout_ms: hardware.timeout_ms,
            status_enabled: status.enabled,
            status_port: status.port,
            status_request_timeout_ms: status.request_timeout_ms,
            metrics_log_secs: status.metrics_log_secs,
            notify_mode: notify.mode,
            notify_queue_len: notify.queue_len,
            notify_timeout_ms: notify.timeout_ms,
            telegram_token: notify.telegram_token,
            telegram_chat_id: notify.telegram_chat_id,
            telegram_api: notify.telegram_api,
            mqtt_host: notify.mqtt_host,
            mqtt_port: notify.mqtt_port,
            mqtt_topic: notify.mqtt_topic,
            mqtt_username: notify.mqtt_username,
            mqtt_password: notify.mqtt_password,
            config_file,
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, source: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).with_context(|| format!("Failed to parse config {source}"))?;
        let config = Self::from_toml(toml_config, source.to_string());
        config.validate().with_context(|| format!("Invalid config {source}"))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            (1..=MAX_SLOTS).contains(&self.slot_count),
            "bay.slots must be between 1 and {MAX_SLOTS}, got {}",
            self.slot_count
        );
        ensure!(self.history_len >= 1, "bay.history_len must be at least 1");
        ensure!(self.tick_ms >= 1, "bay.tick_ms must be at least 1");
        ensure!(
            self.entry_threshold_cm.is_finite() && self.entry_threshold_cm > 0.0,
            "entry.threshold_cm must be a positive number"
        );
        ensure!(self.entry_check_interval_ms >= 1, "entry.check_interval_ms must be at least 1");
        ensure!(self.notify_queue_len >= 1, "notify.queue_len must be at least 1");
        Ok(())
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn price_per_minute_cents(&self) -> u64 {
        self.price_per_minute_cents
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn history_len(&self) -> usize {
        self.history_len
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    pub fn entry_threshold_cm(&self) -> f64 {
        self.entry_threshold_cm
    }

    pub fn entry_check_interval_ms(&self) -> u64 {
        self.entry_check_interval_ms
    }

    pub fn no_car_grace_ms(&self) -> u64 {
        self.no_car_grace_ms
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    pub fn exit_grace_ms(&self) -> u64 {
        self.exit_grace_ms
    }

    pub fn ir_active_low(&self) -> bool {
        self.ir_active_low
    }

    pub fn gate_open_duty(&self) -> u8 {
        self.gate_open_duty
    }

    pub fn gate_closed_duty(&self) -> u8 {
        self.gate_closed_duty
    }

    pub fn gate_actuation_ms(&self) -> u64 {
        self.gate_actuation_ms
    }

    pub fn hardware_mode(&self) -> HardwareMode {
        self.hardware_mode
    }

    pub fn serial_device(&self) -> &str {
        &self.serial_device
    }

    pub fn serial_baud(&self) -> u32 {
        self.serial_baud
    }

    pub fn hardware_timeout_ms(&self) -> u64 {
        self.hardware_timeout_ms
    }

    pub fn status_enabled(&self) -> bool {
        self.status_enabled
    }

    pub fn status_port(&self) -> u16 {
        self.status_port
    }

    pub fn status_request_timeout_ms(&self) -> u64 {
        self.status_request_timeout_ms
    }

    pub fn metrics_log_secs(&self) -> u64 {
        self.metrics_log_secs
    }

    pub fn notify_mode(&self) -> NotifyMode {
        self.notify_mode
    }

    pub fn notify_queue_len(&self) -> usize {
        self.notify_queue_len
    }

    pub fn notify_timeout_ms(&self) -> u64 {
        self.notify_timeout_ms
    }

    pub fn telegram_token(&self) -> Option<&str> {
        self.telegram_token.as_deref()
    }

    pub fn telegram_chat_id(&self) -> Option<&str> {
        self.telegram_chat_id.as_deref()
    }

    pub fn telegram_api(&self) -> &str {
        &self.telegram_api
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests and the simulator to pick the hardware backend
    pub fn with_hardware_mode(mut self, mode: HardwareMode) -> Self {
        self.hardware_mode = mode;
        self
    }

    /// Builder method for tests to shrink timing windows
    pub fn with_timing(mut self, debounce_ms: u64, exit_grace_ms: u64, no_car_grace_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self.exit_grace_ms = exit_grace_ms;
        self.no_car_grace_ms = no_car_grace_ms;
        self
    }

    /// Builder method for tests to set the gate servo travel time
    pub fn with_gate_actuation_ms(mut self, ms: u64) -> Self {
        self.gate_actuation_ms = ms;
        self
    }

    /// Builder method for tests to disable the status server
    pub fn with_status_enabled(mut self, enabled: bool) -> Self {
        self.status_enabled = enabled;
        self
    }
}
