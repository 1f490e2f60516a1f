//! Publisher runtime
//!
//! Owns the state machine and drives it from a single task: the periodic
//! publish timer, queued link/client notifications and the shutdown signal
//! all meet in one `select!` loop.

use crate::error::PublisherError;
use crate::environment::TickSource;
use crate::observability::metrics::{metrics, MetricsCollector};
use crate::publisher::{
    ConnectionState, ConnectionStateMachine, EventReceiver, PublisherEvent, Step, StepOutcome,
};
use crate::publisher_span;
use crate::transport::BrokerClient;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Single consumer of the publisher event queue
pub struct PublisherRuntime<B: BrokerClient, C: TickSource> {
    machine: ConnectionStateMachine<B>,
    clock: C,
    events: EventReceiver,
    period: Duration,
    metrics: &'static MetricsCollector,
}

impl<B: BrokerClient, C: TickSource> PublisherRuntime<B, C> {
    /// `events` must be the receiving half of the queue the machine notifies
    pub fn new(
        machine: ConnectionStateMachine<B>,
        clock: C,
        events: EventReceiver,
        period: Duration,
    ) -> Self {
        Self {
            machine,
            clock,
            events,
            period,
            metrics: metrics(),
        }
    }

    /// Record steps into a collector other than the global one
    pub fn with_metrics(mut self, collector: &'static MetricsCollector) -> Self {
        self.metrics = collector;
        self
    }

    pub fn machine(&self) -> &ConnectionStateMachine<B> {
        &self.machine
    }

    /// Run until shutdown is signalled; returns the final state
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> ConnectionState {
        info!(
            period_ms = self.period.as_millis() as u64,
            topic = %self.machine.settings().topic,
            "Starting publisher runtime"
        );
        self.metrics.set_publisher_state(self.machine.state());

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // First tick completes immediately, skip it

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping publisher");
                        break;
                    }
                }

                event = self.events.recv() => match event {
                    Some(event) => {
                        self.dispatch(event);
                    }
                    None => {
                        warn!("Event queue closed, stopping publisher");
                        break;
                    }
                },

                _ = interval.tick() => {
                    let ticks = self.clock.ticks();
                    self.dispatch(PublisherEvent::Tick(ticks));
                }
            }
        }

        self.machine.shutdown();
        self.metrics.mqtt_connection_lost();
        let final_state = self.machine.state();
        self.metrics.set_publisher_state(final_state);
        info!(state = %final_state, "Publisher runtime stopped");
        final_state
    }

    /// Feed one event to the machine and record the result
    pub fn dispatch(&mut self, event: PublisherEvent) -> Step {
        let ticks = match event {
            PublisherEvent::Tick(ticks) => Some(ticks),
            _ => None,
        };

        let span = publisher_span!(event = event.kind());
        let _guard = span.enter();

        let step = self.machine.handle(event);
        if step.changed_state() {
            info!(from = %step.from, to = %step.to, "State transition");
        } else {
            debug!(state = %step.to, outcome = ?step.outcome, "Event handled");
        }
        record_step(self.metrics, &step, ticks);
        step
    }
}

/// Translate a step into metrics updates
fn record_step(collector: &MetricsCollector, step: &Step, ticks: Option<u64>) {
    match &step.outcome {
        StepOutcome::Idle => {}
        StepOutcome::LinkUp => collector.link_up(),
        StepOutcome::LinkDown { discarded } => collector.link_down(discarded.is_some()),
        StepOutcome::ConnectRequested(_) => collector.mqtt_connection_attempt(),
        StepOutcome::Ready(_) => collector.mqtt_connection_established(),
        StepOutcome::Published(_) => collector.mqtt_message_published(ticks.unwrap_or_default()),
        StepOutcome::Recovered(error) => match error {
            PublisherError::ConnectInitFailure(_) => collector.mqtt_connection_failed(),
            PublisherError::AsyncClientError { .. } => collector.mqtt_client_error(),
            PublisherError::PublishFailure(_) => collector.mqtt_publish_failed(),
            _ => {}
        },
        StepOutcome::Anomaly(_) => collector.anomaly(),
    }
    collector.set_publisher_state(step.to);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::SchedulerClock;
    use crate::publisher::EventSender;
    use crate::testing::mocks::{
        test_publisher_settings, ConnectBehavior, ManualClock, MockBroker,
    };

    fn leaked_metrics() -> &'static MetricsCollector {
        Box::leak(Box::new(MetricsCollector::new()))
    }

    fn runtime_with<C: TickSource>(
        broker: MockBroker,
        clock: C,
    ) -> (PublisherRuntime<MockBroker, C>, EventSender) {
        let (notifier, events) = EventSender::channel();
        let machine =
            ConnectionStateMachine::new(broker, test_publisher_settings(), notifier.clone());
        let runtime = PublisherRuntime::new(machine, clock, events, Duration::from_millis(500))
            .with_metrics(leaked_metrics());
        (runtime, notifier)
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_once_per_period() {
        let broker = MockBroker::with_behavior(ConnectBehavior::Ready);
        let (runtime, notifier) = runtime_with(broker.clone(), SchedulerClock::new(100));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        notifier.network_up();
        let handle = tokio::spawn(runtime.run(shutdown_rx));

        // 500 ms: connect, ready; 1000/1500/2000 ms: publish
        tokio::time::sleep(Duration::from_millis(2250)).await;
        shutdown_tx.send(true).unwrap();
        let final_state = handle.await.unwrap();

        let payloads: Vec<Vec<u8>> = broker
            .published()
            .into_iter()
            .map(|message| message.payload)
            .collect();
        assert_eq!(
            payloads,
            vec![
                b"00000100".to_vec(),
                b"00000150".to_vec(),
                b"00000200".to_vec()
            ]
        );
        assert_eq!(final_state, ConnectionState::WaitingForNetwork);
        assert_eq!(broker.finalized().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_network_before_connecting() {
        let broker = MockBroker::with_behavior(ConnectBehavior::Ready);
        let (runtime, notifier) = runtime_with(broker.clone(), ManualClock::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(runtime.run(shutdown_rx));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(broker.initialize_calls(), 0);

        notifier.network_up();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(broker.initialize_calls(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_connect_survives_ticks() {
        let broker = MockBroker::with_behavior(ConnectBehavior::Silent);
        let (runtime, notifier) = runtime_with(broker.clone(), ManualClock::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        notifier.network_up();
        let handle = tokio::spawn(runtime.run(shutdown_rx));
        tokio::time::sleep(Duration::from_secs(10)).await;

        shutdown_tx.send(true).unwrap();
        let final_state = handle.await.unwrap();

        assert_eq!(broker.initialize_calls(), 1);
        assert!(broker.published().is_empty());
        assert_eq!(final_state, ConnectionState::WaitingForNetwork);
        // The pending client is still owned, so shutdown finalizes it
        assert_eq!(broker.finalized().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_sender_stops_runtime() {
        let (runtime, _notifier) = runtime_with(MockBroker::new(), ManualClock::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(runtime.run(shutdown_rx));
        drop(shutdown_tx);
        assert_eq!(handle.await.unwrap(), ConnectionState::WaitingForNetwork);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clears_connection_metrics() {
        let collector = leaked_metrics();
        let broker = MockBroker::with_behavior(ConnectBehavior::Ready);
        let (notifier, events) = EventSender::channel();
        let machine =
            ConnectionStateMachine::new(broker.clone(), test_publisher_settings(), notifier.clone());
        let runtime = PublisherRuntime::new(
            machine,
            ManualClock::new(0),
            events,
            Duration::from_millis(500),
        )
        .with_metrics(collector);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        notifier.network_up();
        let handle = tokio::spawn(runtime.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(750)).await;
        assert!(collector.get_metrics().mqtt.connected);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let snapshot = collector.get_metrics();
        assert!(!snapshot.mqtt.connected);
        assert_eq!(snapshot.mqtt.connection_duration_seconds, 0);
        assert_eq!(
            snapshot.lifecycle.current_state,
            ConnectionState::WaitingForNetwork
        );
        assert_eq!(broker.finalized().len(), 1);
    }

    #[test]
    fn test_dispatch_records_metrics() {
        let collector = leaked_metrics();
        let broker = MockBroker::with_behavior(ConnectBehavior::Silent);
        let (notifier, events) = EventSender::channel();
        let machine =
            ConnectionStateMachine::new(broker.clone(), test_publisher_settings(), notifier);
        let mut runtime = PublisherRuntime::new(
            machine,
            ManualClock::new(0),
            events,
            Duration::from_millis(500),
        )
        .with_metrics(collector);

        let step = runtime.dispatch(PublisherEvent::NetworkUp);
        assert_eq!(step.event, "network_up");
        assert!(step.changed_state());
        runtime.dispatch(PublisherEvent::Tick(1));
        let token = runtime.machine().handle_token().unwrap();
        runtime.dispatch(PublisherEvent::ClientReady(token));
        runtime.dispatch(PublisherEvent::Tick(42));
        broker.fail_next_publish();
        runtime.dispatch(PublisherEvent::Tick(43));
        runtime.dispatch(PublisherEvent::NetworkUp);

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.link.link_ups, 1);
        assert_eq!(snapshot.mqtt.connection_attempts, 1);
        assert_eq!(snapshot.mqtt.connections_established, 1);
        assert_eq!(snapshot.mqtt.messages_published, 1);
        assert_eq!(snapshot.mqtt.last_published_ticks, 42);
        assert_eq!(snapshot.mqtt.publish_failures, 1);
        assert_eq!(snapshot.lifecycle.anomalies, 1);
        assert_eq!(snapshot.lifecycle.current_state, ConnectionState::NetworkUp);
    }
}
