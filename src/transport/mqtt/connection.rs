//! Pure connection configuration for the MQTT client
//!
//! This module contains pure functions for broker URL parsing, option
//! construction and publish frame sizing.

use crate::transport::{BrokerAddress, ClientSettings, QoS};
use rumqttc::Transport as RumqttcTransport;
use rumqttc::v5::{mqttbytes::QoS as RumqttcQoS, MqttOptions};
use thiserror::Error;
use url::Url;

const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_MQTTS_PORT: u16 = 8883;

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("No async runtime available to drive the MQTT event loop")]
    NoRuntime,
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid client settings: {0}")]
    InvalidSettings(String),
    #[error("Publish frame of {frame} bytes exceeds buffer size {limit}")]
    FrameTooLarge { frame: usize, limit: usize },
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Parse `mqtt://host[:port]` or `mqtts://host[:port]` (pure function)
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerAddress, MqttError> {
    let url = Url::parse(broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    let tls = match url.scheme() {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" => true,
        _ => return Err(MqttError::InvalidBrokerUrl(broker_url.to_string())),
    };

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url
        .port()
        .unwrap_or(if tls { DEFAULT_MQTTS_PORT } else { DEFAULT_MQTT_PORT });

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

/// Pure function to configure MQTT options from client settings
pub fn configure_mqtt_options(settings: &ClientSettings) -> Result<MqttOptions, MqttError> {
    let keep_alive = settings.keep_alive;
    if !keep_alive.is_zero() && keep_alive.as_secs() == 0 {
        return Err(MqttError::InvalidSettings(format!(
            "keep-alive must be zero or at least one second, got {keep_alive:?}"
        )));
    }
    if keep_alive.as_secs() > u64::from(u16::MAX) {
        return Err(MqttError::InvalidSettings(format!(
            "keep-alive must fit in 16 bits, got {}s",
            keep_alive.as_secs()
        )));
    }
    if settings.buffers.count == 0 {
        return Err(MqttError::InvalidSettings(
            "at least one outgoing buffer is required".to_string(),
        ));
    }

    let broker = &settings.broker;
    let mut mqtt_options = MqttOptions::new(
        settings.client_id.as_str(),
        broker.host.as_str(),
        broker.port,
    );

    if broker.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(credentials) = &settings.credentials {
        mqtt_options.set_credentials(
            credentials.username.as_str(),
            credentials.password.as_str(),
        );
    }

    mqtt_options.set_keep_alive(keep_alive);

    Ok(mqtt_options)
}

/// Map the transport QoS onto rumqttc's (pure function)
pub fn to_rumqttc_qos(qos: QoS) -> RumqttcQoS {
    match qos {
        QoS::AtMostOnce => RumqttcQoS::AtMostOnce,
        QoS::AtLeastOnce => RumqttcQoS::AtLeastOnce,
        QoS::ExactlyOnce => RumqttcQoS::ExactlyOnce,
    }
}

/// Encoded size of a QoS 0 MQTT v5 PUBLISH without properties (pure function)
///
/// Fixed header byte, remaining-length varint, topic length prefix, topic,
/// empty property block and payload.
pub fn publish_frame_len(topic: &str, payload_len: usize) -> usize {
    let remaining = 2 + topic.len() + 1 + payload_len;
    1 + varint_len(remaining) + remaining
}

fn varint_len(value: usize) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}
