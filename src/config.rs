//! Configuration system for the telemetry agent
//!
//! Every tunable lives in one immutable [`AgentConfig`], loaded once at
//! startup and passed by reference into the agent. Secrets are referenced by environment variable name and
//! resolved at runtime, never stored in the file.

use crate::protocol::topics::{telemetry_topic, validate_device_id, validate_publish_topic};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub device: DeviceSection,
    #[serde(default)]
    pub network: NetworkSection,
    pub mqtt: MqttSection,
    pub notifier: NotifierSection,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub alerts: AlertSection,
    #[serde(default)]
    pub sampler: SamplerSection,
    #[serde(default)]
    pub agent: LoopSection,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device identifier (must match [a-zA-Z0-9._-]+)
    pub id: String,
    /// Publish topic; defaults to `sensors/water/<id>`
    pub topic: Option<String>,
}

impl DeviceSection {
    /// Topic readings are published to
    pub fn telemetry_topic(&self) -> String {
        self.topic
            .clone()
            .unwrap_or_else(|| telemetry_topic(&self.id))
    }
}

/// Network association settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// Interface whose operstate signals association (e.g. "wlan0")
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Command issued as the connect request, e.g. `["nmcli", "device", "connect", "wlan0"]`
    #[serde(default)]
    pub connect_command: Vec<String>,
    /// Bounded wait for association after a connect request
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Poll interval while waiting for association
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            connect_command: Vec::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_interface() -> String {
    "wlan0".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    20_000
}

fn default_poll_interval_ms() -> u64 {
    300
}

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Client id is `<client_id_prefix>-<device id>`
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    /// Keep alive interval in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// How long a single connect attempt waits for ConnAck
    #[serde(default = "default_connack_timeout_ms")]
    pub connack_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetrySection,
}

impl MqttSection {
    /// Get MQTT username from environment variable
    pub fn username(&self) -> Option<String> {
        AgentConfig::get_env_var_optional(self.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn password(&self) -> Option<String> {
        AgentConfig::get_env_var_optional(self.password_env.as_ref())
    }

    /// Username and password for the broker. None without a username; a
    /// missing password is sent as empty.
    pub fn credentials(&self) -> Option<(String, String)> {
        self.username()
            .map(|username| (username, self.password().unwrap_or_default()))
    }
}

fn default_client_id_prefix() -> String {
    "esp32".to_string()
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_connack_timeout_ms() -> u64 {
    5_000
}

/// Broker reconnect policy. Defaults retry forever with a fixed delay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    /// Maximum connect attempts per `ensure_up` (absent = unlimited)
    pub max_attempts: Option<u32>,
    /// Optional per-attempt delays in milliseconds before settling on `delay_ms`
    #[serde(default)]
    pub backoff_pattern_ms: Vec<u64>,
    /// Delay between attempts once the pattern is exhausted
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_pattern_ms: Vec::new(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// Telegram notifier settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifierSection {
    /// API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable containing the bot token
    pub bot_token_env: String,
    /// Target chat
    pub chat_id: String,
    /// Skip certificate validation. Off unless explicitly enabled.
    #[serde(default)]
    pub insecure_tls: bool,
    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Alert bounds. Values strictly outside `[low, high]` are violations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThresholdConfig {
    pub ph_low: f64,
    pub ph_high: f64,
    pub orp_low: f64,
    pub orp_high: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            ph_low: 6.5,
            ph_high: 8.5,
            orp_low: 100.0,
            orp_high: 600.0,
        }
    }
}

impl ThresholdConfig {
    /// Validate that bounds are finite and ordered
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pairs = [
            ("ph", self.ph_low, self.ph_high),
            ("orp", self.orp_low, self.orp_high),
        ];
        for (name, low, high) in pairs {
            if !low.is_finite() || !high.is_finite() {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} thresholds must be finite"
                )));
            }
            if low > high {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name}_low ({low}) must not exceed {name}_high ({high})"
                )));
            }
        }
        Ok(())
    }
}

/// Alert rate limiting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertSection {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for AlertSection {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_cooldown_secs() -> u64 {
    60
}

/// Analog sampling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplerSection {
    /// IIO device directory holding `in_voltage<N>_raw` files
    #[serde(default = "default_iio_device")]
    pub iio_device: PathBuf,
    #[serde(default = "default_ph_channel")]
    pub ph_channel: u8,
    #[serde(default = "default_orp_channel")]
    pub orp_channel: u8,
    /// Full-scale raw reading (12-bit ADC by default)
    #[serde(default = "default_max_raw")]
    pub max_raw: u16,
    #[serde(default = "default_reference_voltage")]
    pub reference_voltage: f64,
}

impl Default for SamplerSection {
    fn default() -> Self {
        Self {
            iio_device: default_iio_device(),
            ph_channel: default_ph_channel(),
            orp_channel: default_orp_channel(),
            max_raw: default_max_raw(),
            reference_voltage: default_reference_voltage(),
        }
    }
}

fn default_iio_device() -> PathBuf {
    PathBuf::from("/sys/bus/iio/devices/iio:device0")
}

fn default_ph_channel() -> u8 {
    0
}

fn default_orp_channel() -> u8 {
    1
}

fn default_max_raw() -> u16 {
    4095
}

fn default_reference_voltage() -> f64 {
    3.3
}

/// Main loop pacing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopSection {
    /// Pause between iterations
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Pause after an iteration skipped for lack of connectivity
    #[serde(default = "default_penalty_ms")]
    pub penalty_ms: u64,
}

impl Default for LoopSection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            penalty_ms: default_penalty_ms(),
        }
    }
}

fn default_interval_ms() -> u64 {
    5_000
}

fn default_penalty_ms() -> u64 {
    1_000
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid device ID format: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.device.id)
            .map_err(|e| ConfigError::InvalidDeviceId(format!("'{}': {e}", self.device.id)))?;
        if let Some(topic) = &self.device.topic {
            validate_publish_topic(topic).map_err(|e| {
                ConfigError::InvalidConfig(format!("Invalid device topic '{topic}': {e}"))
            })?;
        }
        self.thresholds.validate()?;

        url::Url::parse(&self.mqtt.broker_url).map_err(|_| {
            ConfigError::InvalidConfig(format!("Invalid broker URL: {}", self.mqtt.broker_url))
        })?;

        if self.network.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "network.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.retry.max_attempts == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "mqtt.retry.max_attempts must be greater than 0 or absent for unlimited"
                    .to_string(),
            ));
        }
        if self.mqtt.retry.delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.retry.delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.sampler.max_raw == 0 {
            return Err(ConfigError::InvalidConfig(
                "sampler.max_raw must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Get the Telegram bot token from environment variable
    pub fn get_bot_token(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.notifier.bot_token_env)
    }

    /// Fixed MQTT client identifier derived from the device identity
    pub fn mqtt_client_id(&self) -> String {
        format!("{}-{}", self.mqtt.client_id_prefix, self.device.id)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.agent.interval_ms)
    }

    pub fn penalty(&self) -> Duration {
        Duration::from_millis(self.agent.penalty_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.alerts.cooldown_secs)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
id = "tank1"

[mqtt]
broker_url = "mqtt://localhost:1883"

[notifier]
bot_token_env = "TG_BOT_TOKEN"
chat_id = "123456789"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
