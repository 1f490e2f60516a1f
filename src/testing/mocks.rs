//! Mock implementations for testing
//!
//! Provides a mock broker client, a manually driven tick clock and a
//! scripted link probe so the state machine and runtime can be exercised
//! without a broker or a network.

use crate::environment::{LinkProbe, TickSource};
use crate::publisher::{
    ClientId, ClientToken, EventSender, HardwareAddress, PublisherSettings,
};
use crate::transport::{
    BrokerAddress, BrokerClient, BufferSettings, ClientHandle, ClientSettings, QoS,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Publish recorded by [`MockBroker`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub token: ClientToken,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// How a mock client reports its connection outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectBehavior {
    /// Never report anything; the test delivers notifications itself
    #[default]
    Silent,
    /// Report ready right away through the notifier
    Ready,
    /// Report an error right away through the notifier
    Refuse,
}

#[derive(Debug, Error)]
#[error("mock broker failure: {0}")]
pub struct MockBrokerError(pub String);

#[derive(Debug, Default)]
struct MockBrokerState {
    next_token: u64,
    behavior: ConnectBehavior,
    fail_initialize: u32,
    fail_publish: u32,
    initialize_calls: u32,
    last_settings: Option<ClientSettings>,
    published: Vec<PublishedMessage>,
    finalized: Vec<ClientToken>,
    dropped: Vec<ClientToken>,
}

/// Mock broker client
///
/// Clones share state, so a test can keep one clone for inspection while
/// the state machine owns another.
#[derive(Debug, Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<MockBrokerState>>,
}

/// Handle issued by [`MockBroker`]; records being dropped without finalize
#[derive(Debug)]
pub struct MockHandle {
    token: ClientToken,
    finalized: bool,
    state: Arc<Mutex<MockBrokerState>>,
}

impl ClientHandle for MockHandle {
    fn token(&self) -> ClientToken {
        self.token
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if !self.finalized {
            if let Ok(mut state) = self.state.lock() {
                state.dropped.push(self.token);
            }
        }
    }
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: ConnectBehavior) -> Self {
        let broker = Self::default();
        broker.lock().behavior = behavior;
        broker
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockBrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_behavior(&self, behavior: ConnectBehavior) {
        self.lock().behavior = behavior;
    }

    pub fn fail_next_initialize(&self) {
        self.lock().fail_initialize += 1;
    }

    pub fn fail_next_publish(&self) {
        self.lock().fail_publish += 1;
    }

    pub fn initialize_calls(&self) -> u32 {
        self.lock().initialize_calls
    }

    pub fn last_settings(&self) -> Option<ClientSettings> {
        self.lock().last_settings.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    pub fn finalized(&self) -> Vec<ClientToken> {
        self.lock().finalized.clone()
    }

    pub fn dropped(&self) -> Vec<ClientToken> {
        self.lock().dropped.clone()
    }
}

impl BrokerClient for MockBroker {
    type Handle = MockHandle;
    type Error = MockBrokerError;

    fn initialize(
        &mut self,
        settings: &ClientSettings,
        notifier: EventSender,
    ) -> Result<Self::Handle, Self::Error> {
        let (token, behavior) = {
            let mut state = self.lock();
            state.initialize_calls += 1;
            state.last_settings = Some(settings.clone());
            if state.fail_initialize > 0 {
                state.fail_initialize -= 1;
                return Err(MockBrokerError("initialize refused".to_string()));
            }
            state.next_token += 1;
            (ClientToken(state.next_token), state.behavior)
        };

        match behavior {
            ConnectBehavior::Silent => {}
            ConnectBehavior::Ready => notifier.client_ready(token),
            ConnectBehavior::Refuse => notifier.client_error(token, "connection refused"),
        }

        Ok(MockHandle {
            token,
            finalized: false,
            state: self.state.clone(),
        })
    }

    fn publish(
        &mut self,
        handle: &Self::Handle,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.fail_publish > 0 {
            state.fail_publish -= 1;
            return Err(MockBrokerError("publish refused".to_string()));
        }
        state.published.push(PublishedMessage {
            token: handle.token,
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        Ok(())
    }

    fn finalize(&mut self, mut handle: Self::Handle) {
        handle.finalized = true;
        self.lock().finalized.push(handle.token);
    }
}

/// Tick source driven by the test
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Relaxed);
    }

    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::Relaxed);
    }
}

impl TickSource for ManualClock {
    fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// Link probe replaying a scripted sequence of observations
///
/// Once the script is exhausted the last observation repeats.
#[derive(Debug, Clone)]
pub struct ScriptedLinkProbe {
    script: Arc<Mutex<VecDeque<bool>>>,
    last: Arc<Mutex<bool>>,
}

impl ScriptedLinkProbe {
    pub fn new<I: IntoIterator<Item = bool>>(observations: I) -> Self {
        Self {
            script: Arc::new(Mutex::new(observations.into_iter().collect())),
            last: Arc::new(Mutex::new(false)),
        }
    }
}

#[async_trait]
impl LinkProbe for ScriptedLinkProbe {
    async fn is_up(&self) -> bool {
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(observed) = next {
            *last = observed;
        }
        *last
    }
}

/// Hardware address used across tests
pub const TEST_HARDWARE_ADDRESS: HardwareAddress =
    HardwareAddress([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

/// Client settings matching the default configuration
pub fn test_client_settings() -> ClientSettings {
    ClientSettings {
        client_id: ClientId::generate("modulino", &TEST_HARDWARE_ADDRESS)
            .expect("test client id should be valid"),
        broker: BrokerAddress {
            host: "localhost".to_string(),
            port: 1883,
            tls: false,
        },
        keep_alive: Duration::from_secs(400),
        buffers: BufferSettings { count: 2, size: 32 },
        credentials: None,
    }
}

/// Publisher settings matching the default configuration
pub fn test_publisher_settings() -> PublisherSettings {
    PublisherSettings {
        client: test_client_settings(),
        topic: "bathos-jiffies".to_string(),
        qos: QoS::AtMostOnce,
    }
}
