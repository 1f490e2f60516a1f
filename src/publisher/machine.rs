//! The connection state machine
//!
//! One explicit object owns the connection state and the (at most one)
//! broker client handle. Every signal is fed through [`ConnectionStateMachine::handle`],
//! which performs the transition and any side effect, and reports what
//! happened as a [`Step`].
//!
//! Failures never escape: connect, publish and async client errors all
//! release the held client and regress to [`ConnectionState::NetworkUp`],
//! from which the next tick retries. There is no backoff.

use super::events::{ClientToken, EventSender, PublisherEvent};
use super::payload::TickPayload;
use super::state::ConnectionState;
use crate::error::{Anomaly, PublisherError};
use crate::transport::{BrokerClient, ClientHandle, ClientSettings, QoS};
use tracing::{debug, error, info, warn};

/// Fixed publishing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherSettings {
    pub client: ClientSettings,
    pub topic: String,
    pub qos: QoS,
}

/// What a single event did
#[derive(Debug)]
pub enum StepOutcome {
    /// Nothing to do in this state
    Idle,
    /// Link came up
    LinkUp,
    /// Link went down; carries the token of the client that was discarded, if any
    LinkDown { discarded: Option<ClientToken> },
    /// A new client was created and is connecting
    ConnectRequested(ClientToken),
    /// The pending client was accepted by the broker
    Ready(ClientToken),
    /// A payload was published
    Published(TickPayload),
    /// A failure was handled by regressing the state
    Recovered(PublisherError),
    /// An event did not fit the current state and was logged
    Anomaly(Anomaly),
}

/// Result of feeding one event to the state machine
#[derive(Debug)]
pub struct Step {
    pub event: &'static str,
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub outcome: StepOutcome,
}

impl Step {
    pub fn changed_state(&self) -> bool {
        self.from != self.to
    }
}

/// Link-aware connect/publish state machine
pub struct ConnectionStateMachine<B: BrokerClient> {
    broker: B,
    settings: PublisherSettings,
    notifier: EventSender,
    state: ConnectionState,
    handle: Option<B::Handle>,
}

impl<B: BrokerClient> ConnectionStateMachine<B> {
    /// Create a machine in [`ConnectionState::WaitingForNetwork`]
    ///
    /// `notifier` is handed to every client the machine creates so that its
    /// ready/error notifications reach the same event queue.
    pub fn new(broker: B, settings: PublisherSettings, notifier: EventSender) -> Self {
        Self {
            broker,
            settings,
            notifier,
            state: ConnectionState::WaitingForNetwork,
            handle: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Token of the held client, if any
    pub fn handle_token(&self) -> Option<ClientToken> {
        self.handle.as_ref().map(ClientHandle::token)
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Apply one event
    pub fn handle(&mut self, event: PublisherEvent) -> Step {
        let from = self.state;
        let kind = event.kind();

        let outcome = match event {
            PublisherEvent::NetworkUp => self.on_network_up(),
            PublisherEvent::NetworkDown => self.on_network_down(),
            PublisherEvent::Tick(ticks) => self.on_tick(ticks),
            PublisherEvent::ClientReady(token) => self.on_client_ready(token),
            PublisherEvent::ClientError { token, reason } => self.on_client_error(token, reason),
        };

        debug_assert!(
            self.handle.is_none() || self.state.may_hold_handle(),
            "client handle held in state {}",
            self.state
        );

        Step {
            event: kind,
            from,
            to: self.state,
            outcome,
        }
    }

    /// Release any held client and go back to waiting for the network
    pub fn shutdown(&mut self) {
        if let Some(token) = self.handle_token() {
            info!(client = %token, "Finalizing broker client on shutdown");
        }
        self.release_handle();
        self.state = ConnectionState::WaitingForNetwork;
    }

    fn on_network_up(&mut self) -> StepOutcome {
        if self.state != ConnectionState::WaitingForNetwork {
            let anomaly = Anomaly::UnexpectedNetworkUp { state: self.state };
            warn!(%anomaly, "Ignoring network-up");
            return StepOutcome::Anomaly(anomaly);
        }

        info!("Network up");
        self.state = ConnectionState::NetworkUp;

        // Link-down drops the handle, so one can only be left here by a bug.
        if let Some(stale) = self.handle.take() {
            let anomaly = Anomaly::HandleHeldOnNetworkUp {
                token: stale.token(),
            };
            warn!(%anomaly, "Discarding stale client handle");
            return StepOutcome::Anomaly(anomaly);
        }
        StepOutcome::LinkUp
    }

    fn on_network_down(&mut self) -> StepOutcome {
        // No finalize: the link is gone, so the client cannot say goodbye.
        // Dropping the handle still releases its local resources.
        let discarded = self.handle.take().map(|handle| handle.token());
        info!(
            from = %self.state,
            discarded = ?discarded,
            "Network down"
        );
        self.state = ConnectionState::WaitingForNetwork;
        StepOutcome::LinkDown { discarded }
    }

    fn on_tick(&mut self, ticks: u64) -> StepOutcome {
        match self.state {
            ConnectionState::NetworkUp => self.request_connection(),
            state if state.can_publish() => self.publish_ticks(ticks),
            _ => StepOutcome::Idle,
        }
    }

    fn request_connection(&mut self) -> StepOutcome {
        info!(
            client_id = %self.settings.client.client_id,
            broker = %self.settings.client.broker,
            "Initializing broker client"
        );

        match self
            .broker
            .initialize(&self.settings.client, self.notifier.clone())
        {
            Ok(handle) => {
                let token = handle.token();
                debug!(client = %token, "Connection requested");
                self.handle = Some(handle);
                self.state = ConnectionState::ConnectionRequested;
                StepOutcome::ConnectRequested(token)
            }
            Err(e) => {
                error!(error = %e, "Error initializing broker client, retrying next tick");
                StepOutcome::Recovered(PublisherError::connect_init_failure(e.to_string()))
            }
        }
    }

    fn publish_ticks(&mut self, ticks: u64) -> StepOutcome {
        let payload = TickPayload::new(ticks);

        let Some(handle) = self.handle.as_ref() else {
            let anomaly = Anomaly::MissingHandle;
            error!(%anomaly, "Falling back to network-up");
            self.state = ConnectionState::NetworkUp;
            return StepOutcome::Anomaly(anomaly);
        };

        match self.broker.publish(
            handle,
            &self.settings.topic,
            payload.as_bytes(),
            self.settings.qos,
        ) {
            Ok(()) => {
                debug!(topic = %self.settings.topic, payload = %payload, "Published ticks");
                StepOutcome::Published(payload)
            }
            Err(e) => {
                warn!(
                    client = %handle.token(),
                    error = %e,
                    "Publish failed, dropping broker connection"
                );
                self.release_handle();
                self.state = ConnectionState::NetworkUp;
                StepOutcome::Recovered(PublisherError::publish_failure(e.to_string()))
            }
        }
    }

    fn on_client_ready(&mut self, token: ClientToken) -> StepOutcome {
        let pending = self.state == ConnectionState::ConnectionRequested
            && self.handle_token() == Some(token);
        if !pending {
            return self.unknown_client(token);
        }

        info!(client = %token, "Publisher ready");
        self.state = ConnectionState::Connected;
        StepOutcome::Ready(token)
    }

    fn on_client_error(&mut self, token: ClientToken, reason: String) -> StepOutcome {
        if self.handle_token() != Some(token) {
            return self.unknown_client(token);
        }

        warn!(client = %token, %reason, "Publisher error");
        self.release_handle();
        self.state = ConnectionState::NetworkUp;
        StepOutcome::Recovered(PublisherError::AsyncClientError { token, reason })
    }

    fn unknown_client(&self, token: ClientToken) -> StepOutcome {
        let anomaly = Anomaly::UnknownClient {
            token,
            state: self.state,
        };
        debug!(%anomaly, "Ignoring stale client notification");
        StepOutcome::Anomaly(anomaly)
    }

    fn release_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.broker.finalize(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{test_publisher_settings, MockBroker};

    fn machine() -> ConnectionStateMachine<MockBroker> {
        let (notifier, _rx) = EventSender::channel();
        ConnectionStateMachine::new(MockBroker::new(), test_publisher_settings(), notifier)
    }

    fn connected_machine() -> ConnectionStateMachine<MockBroker> {
        let mut machine = machine();
        machine.handle(PublisherEvent::NetworkUp);
        let step = machine.handle(PublisherEvent::Tick(1));
        let StepOutcome::ConnectRequested(token) = step.outcome else {
            panic!("expected a connect request, got {:?}", step.outcome);
        };
        machine.handle(PublisherEvent::ClientReady(token));
        assert_eq!(machine.state(), ConnectionState::Connected);
        machine
    }

    #[test]
    fn test_starts_waiting_without_handle() {
        let machine = machine();
        assert_eq!(machine.state(), ConnectionState::WaitingForNetwork);
        assert!(!machine.has_handle());
    }

    #[test]
    fn test_tick_while_waiting_is_idle() {
        let mut machine = machine();
        let step = machine.handle(PublisherEvent::Tick(10));
        assert!(matches!(step.outcome, StepOutcome::Idle));
        assert_eq!(machine.state(), ConnectionState::WaitingForNetwork);
        assert_eq!(machine.broker().initialize_calls(), 0);
    }

    #[test]
    fn test_network_up_advances_from_waiting() {
        let mut machine = machine();
        let step = machine.handle(PublisherEvent::NetworkUp);
        assert!(matches!(step.outcome, StepOutcome::LinkUp));
        assert!(step.changed_state());
        assert_eq!(step.to, ConnectionState::NetworkUp);
    }

    #[test]
    fn test_unexpected_network_up_is_ignored() {
        let mut machine = connected_machine();
        let step = machine.handle(PublisherEvent::NetworkUp);
        assert!(matches!(
            step.outcome,
            StepOutcome::Anomaly(Anomaly::UnexpectedNetworkUp {
                state: ConnectionState::Connected
            })
        ));
        assert_eq!(machine.state(), ConnectionState::Connected);
        assert!(machine.has_handle());
    }

    #[test]
    fn test_connect_success_keeps_pending_handle() {
        let mut machine = machine();
        machine.handle(PublisherEvent::NetworkUp);
        let step = machine.handle(PublisherEvent::Tick(1));

        assert!(matches!(step.outcome, StepOutcome::ConnectRequested(_)));
        assert_eq!(machine.state(), ConnectionState::ConnectionRequested);
        assert!(machine.has_handle(), "pending client must stay reachable");

        let settings = machine.broker().last_settings().unwrap();
        assert_eq!(settings, machine.settings().client);
    }

    #[test]
    fn test_connect_failure_stays_network_up() {
        let mut machine = machine();
        machine.broker().fail_next_initialize();
        machine.handle(PublisherEvent::NetworkUp);

        let step = machine.handle(PublisherEvent::Tick(1));
        assert!(matches!(
            step.outcome,
            StepOutcome::Recovered(PublisherError::ConnectInitFailure(_))
        ));
        assert_eq!(machine.state(), ConnectionState::NetworkUp);
        assert!(!machine.has_handle());
    }

    #[test]
    fn test_ticks_while_requested_wait_forever() {
        let mut machine = machine();
        machine.handle(PublisherEvent::NetworkUp);
        machine.handle(PublisherEvent::Tick(1));

        for ticks in 2..500 {
            let step = machine.handle(PublisherEvent::Tick(ticks));
            assert!(matches!(step.outcome, StepOutcome::Idle));
        }
        assert_eq!(machine.state(), ConnectionState::ConnectionRequested);
        assert_eq!(machine.broker().initialize_calls(), 1);
        assert!(machine.broker().published().is_empty());
    }

    #[test]
    fn test_publish_success_stays_connected() {
        let mut machine = connected_machine();
        let step = machine.handle(PublisherEvent::Tick(1234));

        match step.outcome {
            StepOutcome::Published(payload) => assert_eq!(payload.as_str(), "00001234"),
            other => panic!("expected publish, got {other:?}"),
        }
        assert_eq!(machine.state(), ConnectionState::Connected);

        let published = machine.broker().published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "bathos-jiffies");
        assert_eq!(published[0].payload, b"00001234");
        assert_eq!(published[0].qos, QoS::AtMostOnce);
    }

    #[test]
    fn test_publish_failure_finalizes_and_regresses() {
        let mut machine = connected_machine();
        let token = machine.handle_token().unwrap();
        machine.broker().fail_next_publish();

        let step = machine.handle(PublisherEvent::Tick(5));
        assert!(matches!(
            step.outcome,
            StepOutcome::Recovered(PublisherError::PublishFailure(_))
        ));
        assert_eq!(machine.state(), ConnectionState::NetworkUp);
        assert!(!machine.has_handle());
        assert_eq!(machine.broker().finalized(), vec![token]);
    }

    #[test]
    fn test_client_error_finalizes_pending_client() {
        let mut machine = machine();
        machine.handle(PublisherEvent::NetworkUp);
        machine.handle(PublisherEvent::Tick(1));
        let token = machine.handle_token().unwrap();

        let step = machine.handle(PublisherEvent::ClientError {
            token,
            reason: "connection refused".to_string(),
        });
        assert!(matches!(
            step.outcome,
            StepOutcome::Recovered(PublisherError::AsyncClientError { .. })
        ));
        assert_eq!(machine.state(), ConnectionState::NetworkUp);
        assert_eq!(machine.broker().finalized(), vec![token]);
    }

    #[test]
    fn test_client_error_on_connected_client() {
        let mut machine = connected_machine();
        let token = machine.handle_token().unwrap();

        machine.handle(PublisherEvent::ClientError {
            token,
            reason: "broker disconnected".to_string(),
        });
        assert_eq!(machine.state(), ConnectionState::NetworkUp);
        assert!(!machine.has_handle());
    }

    #[test]
    fn test_stale_notifications_are_ignored() {
        let mut machine = machine();
        machine.handle(PublisherEvent::NetworkUp);

        let stale = ClientToken(999);
        let step = machine.handle(PublisherEvent::ClientReady(stale));
        assert!(matches!(
            step.outcome,
            StepOutcome::Anomaly(Anomaly::UnknownClient { .. })
        ));
        let step = machine.handle(PublisherEvent::ClientError {
            token: stale,
            reason: "late".to_string(),
        });
        assert!(matches!(step.outcome, StepOutcome::Anomaly(_)));
        assert_eq!(machine.state(), ConnectionState::NetworkUp);
        assert!(machine.broker().finalized().is_empty());
    }

    #[test]
    fn test_ready_for_connected_client_is_anomaly() {
        let mut machine = connected_machine();
        let token = machine.handle_token().unwrap();
        let step = machine.handle(PublisherEvent::ClientReady(token));
        assert!(matches!(step.outcome, StepOutcome::Anomaly(_)));
        assert_eq!(machine.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_network_down_discards_without_finalize() {
        let mut machine = connected_machine();
        let token = machine.handle_token().unwrap();

        let step = machine.handle(PublisherEvent::NetworkDown);
        assert!(matches!(
            step.outcome,
            StepOutcome::LinkDown { discarded: Some(t) } if t == token
        ));
        assert_eq!(machine.state(), ConnectionState::WaitingForNetwork);
        assert!(!machine.has_handle());
        assert!(machine.broker().finalized().is_empty());
        assert_eq!(machine.broker().dropped(), vec![token]);
    }

    #[test]
    fn test_network_down_from_every_state() {
        let setups: Vec<Vec<PublisherEvent>> = vec![
            vec![],
            vec![PublisherEvent::NetworkUp],
            vec![PublisherEvent::NetworkUp, PublisherEvent::Tick(1)],
        ];
        for events in setups {
            let mut machine = machine();
            for event in events {
                machine.handle(event);
            }
            machine.handle(PublisherEvent::NetworkDown);
            assert_eq!(machine.state(), ConnectionState::WaitingForNetwork);
        }

        let mut machine = connected_machine();
        machine.handle(PublisherEvent::NetworkDown);
        assert_eq!(machine.state(), ConnectionState::WaitingForNetwork);
    }

    #[test]
    fn test_shutdown_finalizes_held_client() {
        let mut machine = connected_machine();
        let token = machine.handle_token().unwrap();
        machine.shutdown();
        assert_eq!(machine.state(), ConnectionState::WaitingForNetwork);
        assert_eq!(machine.broker().finalized(), vec![token]);
    }

    #[test]
    fn test_retry_creates_fresh_client() {
        let mut machine = connected_machine();
        let first = machine.handle_token().unwrap();
        machine.broker().fail_next_publish();
        machine.handle(PublisherEvent::Tick(2));

        machine.handle(PublisherEvent::Tick(3));
        let second = machine.handle_token().unwrap();
        assert_ne!(first, second);
        assert_eq!(machine.state(), ConnectionState::ConnectionRequested);
        assert_eq!(machine.broker().initialize_calls(), 2);
    }
}
