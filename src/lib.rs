//! Tick Publisher - Rust Implementation
//!
//! Publishes the scheduler tick counter to an MQTT broker once the network
//! link and the broker connection are up.
//!
//! # Overview
//!
//! This crate provides:
//! - A four-state connection state machine driven by a periodic tick and by
//!   link and client notifications
//! - A broker client lifecycle backed by rumqttc
//! - Host stand-ins for the device environment (tick clock, link monitor)
//! - A single-task runtime, TOML configuration, structured logging and metrics
//!
//! # Quick Start
//!
//! ```rust
//! use tick_publisher::publisher::{ConnectionState, ConnectionStateMachine, EventSender, PublisherEvent};
//! use tick_publisher::testing::mocks::{test_publisher_settings, ConnectBehavior, MockBroker};
//!
//! let broker = MockBroker::with_behavior(ConnectBehavior::Silent);
//! let (notifier, _events) = EventSender::channel();
//! let mut machine = ConnectionStateMachine::new(broker.clone(), test_publisher_settings(), notifier);
//!
//! machine.handle(PublisherEvent::NetworkUp);
//! machine.handle(PublisherEvent::Tick(10));
//! let token = machine.handle_token().unwrap();
//! machine.handle(PublisherEvent::ClientReady(token));
//! machine.handle(PublisherEvent::Tick(60));
//!
//! assert_eq!(machine.state(), ConnectionState::Connected);
//! assert_eq!(broker.published()[0].payload, b"00000060");
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod observability;
pub mod publisher;
pub mod runtime;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, PublisherConfig};
pub use error::{Anomaly, PublisherError, PublisherResult};
pub use publisher::{
    ClientId, ConnectionState, ConnectionStateMachine, EventSender, HardwareAddress,
    PublisherEvent,
};
pub use runtime::PublisherRuntime;
pub use transport::mqtt::MqttBroker;
