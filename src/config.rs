//! Publisher configuration
//!
//! Loaded from a TOML file. Every value except the device hardware address
//! has a default matching the stock device build: broker
//! `test.mosquitto.org:1883`, keep-alive 400, two 32-byte buffers, topic
//! `bathos-jiffies`, one publish every 500 ms.

use crate::environment::DEFAULT_TICK_HZ;
use crate::publisher::client_id::DEFAULT_CLIENT_ID_PREFIX;
use crate::publisher::{ClientId, ClientIdError, HardwareAddress, PublisherSettings};
use crate::transport::mqtt::connection::{parse_broker_url, publish_frame_len};
use crate::transport::{BufferSettings, ClientSettings, Credentials, QoS};
use crate::publisher::payload::MAX_PAYLOAD_DIGITS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main publisher configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublisherConfig {
    pub device: DeviceSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub link: LinkSection,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Hardware address of the network interface, `aa:bb:cc:dd:ee:ff`
    pub hardware_address: HardwareAddress,
    /// Client id prefix; the id is `<prefix>-xx-xx-xx`
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
}

/// Broker connection and publish parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Number of outgoing request buffers
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,
    /// Size of each outgoing buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Topic the tick counter is published to
    #[serde(default = "default_topic")]
    pub topic: String,
}

/// Timing of the periodic task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleSection {
    /// Period of the publish task in milliseconds
    #[serde(default = "default_publish_period_ms")]
    pub publish_period_ms: u64,
    /// Scheduler tick frequency; the published counter advances at this rate
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
}

/// How link state is detected
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSection {
    #[serde(default)]
    pub mode: LinkMode,
    /// Interval between link probes in milliseconds
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    /// Timeout of a single probe in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Link detection strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LinkMode {
    /// Link is up while the broker accepts TCP connections
    ///
    /// Every probe is a bare connect and close with no CONNECT packet, and
    /// an unreachable broker reads as a link-down.
    #[default]
    TcpProbe,
    /// Link is reported up once at startup and never goes down
    AlwaysUp,
}

fn default_client_id_prefix() -> String {
    DEFAULT_CLIENT_ID_PREFIX.to_string()
}

fn default_broker_url() -> String {
    "mqtt://test.mosquitto.org:1883".to_string()
}

fn default_keep_alive_secs() -> u64 {
    400
}

fn default_buffer_count() -> usize {
    2
}

fn default_buffer_size() -> usize {
    32
}

fn default_topic() -> String {
    "bathos-jiffies".to_string()
}

fn default_publish_period_ms() -> u64 {
    500 // half a second
}

fn default_tick_hz() -> u32 {
    DEFAULT_TICK_HZ
}

fn default_probe_interval_ms() -> u64 {
    2000
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            username_env: None,
            password_env: None,
            keep_alive_secs: default_keep_alive_secs(),
            buffer_count: default_buffer_count(),
            buffer_size: default_buffer_size(),
            topic: default_topic(),
        }
    }
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            publish_period_ms: default_publish_period_ms(),
            tick_hz: default_tick_hz(),
        }
    }
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            mode: LinkMode::default(),
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid client id: {0}")]
    InvalidClientId(#[from] ClientIdError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PublisherConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PublisherConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with defaults for everything but the hardware address
    pub fn with_hardware_address(hardware_address: HardwareAddress) -> Self {
        Self {
            device: DeviceSection {
                hardware_address,
                client_id_prefix: default_client_id_prefix(),
            },
            mqtt: MqttSection::default(),
            schedule: ScheduleSection::default(),
            link: LinkSection::default(),
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.client_id()?;

        parse_broker_url(&self.mqtt.broker_url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(self.mqtt.broker_url.clone()))?;

        validate_topic(&self.mqtt.topic)?;

        if self.mqtt.keep_alive_secs > u64::from(u16::MAX) {
            return Err(ConfigError::InvalidConfig(format!(
                "keep_alive_secs must be at most {}, got {}",
                u16::MAX,
                self.mqtt.keep_alive_secs
            )));
        }

        if self.mqtt.buffer_count == 0 {
            return Err(ConfigError::InvalidConfig(
                "buffer_count must be greater than 0".to_string(),
            ));
        }

        let frame = publish_frame_len(&self.mqtt.topic, MAX_PAYLOAD_DIGITS);
        if frame > self.mqtt.buffer_size {
            return Err(ConfigError::InvalidConfig(format!(
                "buffer_size {} cannot hold a {frame}-byte publish on topic '{}'",
                self.mqtt.buffer_size, self.mqtt.topic
            )));
        }

        if self.schedule.publish_period_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "publish_period_ms must be greater than 0".to_string(),
            ));
        }

        if self.schedule.tick_hz == 0 {
            return Err(ConfigError::InvalidConfig(
                "tick_hz must be greater than 0".to_string(),
            ));
        }

        if self.link.mode == LinkMode::TcpProbe
            && (self.link.probe_interval_ms == 0 || self.link.probe_timeout_ms == 0)
        {
            return Err(ConfigError::InvalidConfig(
                "probe_interval_ms and probe_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Client id derived from the device section
    pub fn client_id(&self) -> Result<ClientId, ClientIdError> {
        ClientId::generate(
            &self.device.client_id_prefix,
            &self.device.hardware_address,
        )
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Get MQTT username from environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.password_env.as_ref())
    }

    /// Credentials are sent only when the username variable is set
    pub fn credentials(&self) -> Option<Credentials> {
        self.get_mqtt_username().map(|username| Credentials {
            username,
            password: self.get_mqtt_password().unwrap_or_default(),
        })
    }

    pub fn publish_period(&self) -> Duration {
        Duration::from_millis(self.schedule.publish_period_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.link.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.link.probe_timeout_ms)
    }

    /// Build the client settings the state machine connects with
    pub fn client_settings(&self) -> Result<ClientSettings, ConfigError> {
        let broker = parse_broker_url(&self.mqtt.broker_url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(self.mqtt.broker_url.clone()))?;

        Ok(ClientSettings {
            client_id: self.client_id()?,
            broker,
            keep_alive: Duration::from_secs(self.mqtt.keep_alive_secs),
            buffers: BufferSettings {
                count: self.mqtt.buffer_count,
                size: self.mqtt.buffer_size,
            },
            credentials: self.credentials(),
        })
    }

    /// Build the full publisher settings
    pub fn publisher_settings(&self) -> Result<PublisherSettings, ConfigError> {
        Ok(PublisherSettings {
            client: self.client_settings()?,
            topic: self.mqtt.topic.clone(),
            qos: QoS::AtMostOnce,
        })
    }
}

/// Publish topics must be non-empty and free of wildcards
fn validate_topic(topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() || topic.contains(['+', '#', '\0']) {
        return Err(ConfigError::InvalidConfig(format!(
            "topic '{topic}' must be non-empty and must not contain wildcards"
        )));
    }
    Ok(())
}
