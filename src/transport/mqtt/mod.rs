//! MQTT broker client built on rumqttc
//!
//! Pure functions are kept apart from I/O so most of the behavior is
//! testable without a broker.
//!
//! # Architecture
//!
//! - [`connection`] - Broker URL parsing, option construction and frame sizing
//! - [`message_handler`] - Routing of event-loop output into client notifications
//! - [`client`] - The [`BrokerClient`](crate::transport::BrokerClient) implementation and its event-loop task
//!
//! # Usage
//!
//! ```rust,no_run
//! use tick_publisher::publisher::EventSender;
//! use tick_publisher::testing::mocks::test_client_settings;
//! use tick_publisher::transport::mqtt::MqttBroker;
//! use tick_publisher::transport::BrokerClient;
//!
//! # tokio_test::block_on(async {
//! let (notifier, mut events) = EventSender::channel();
//! let mut broker = MqttBroker::new();
//! let handle = broker.initialize(&test_client_settings(), notifier)?;
//! // ClientReady or ClientError arrives on `events`
//! let _outcome = events.recv().await;
//! broker.finalize(handle);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

// Re-export public types for convenience
pub use client::{MqttBroker, MqttHandle};
pub use connection::{configure_mqtt_options, parse_broker_url, MqttError};
pub use message_handler::{EventRoute, MessageHandler};
