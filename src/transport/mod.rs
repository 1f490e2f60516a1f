//! Broker client abstraction
//!
//! This module provides the broker-client lifecycle the state machine drives
//! (initialize, publish, finalize) and the MQTT implementation of it.

use crate::publisher::{ClientId, ClientToken, EventSender};
use std::fmt;
use std::time::Duration;

pub mod mqtt;

/// Delivery guarantee requested for a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Fire-and-forget, no acknowledgment tracking
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Broker endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "mqtts" } else { "mqtt" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

/// Outgoing buffer allowance for one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSettings {
    /// Number of requests that may be queued towards the broker
    pub count: usize,
    /// Largest outgoing frame, in bytes
    pub size: usize,
}

/// Username and password resolved from the environment
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Everything needed to create a broker client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub client_id: ClientId,
    pub broker: BrokerAddress,
    pub keep_alive: Duration,
    pub buffers: BufferSettings,
    pub credentials: Option<Credentials>,
}

/// A live broker client owned by the state machine
pub trait ClientHandle: Send + fmt::Debug {
    /// Token carried by this client's ready and error notifications
    fn token(&self) -> ClientToken;
}

/// Broker client lifecycle
///
/// Implementations must not block: `initialize` only starts the connection
/// and reports its outcome later through the notifier, with either
/// [`EventSender::client_ready`] or [`EventSender::client_error`].
pub trait BrokerClient: Send {
    type Handle: ClientHandle;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start connecting a new client; returns its handle immediately
    fn initialize(
        &mut self,
        settings: &ClientSettings,
        notifier: EventSender,
    ) -> Result<Self::Handle, Self::Error>;

    /// Queue a publish on a connected client
    fn publish(
        &mut self,
        handle: &Self::Handle,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> Result<(), Self::Error>;

    /// Tear down a client and release everything it holds
    fn finalize(&mut self, handle: Self::Handle);
}
