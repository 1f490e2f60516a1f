//! End-to-end scenarios for the connection state machine
//!
//! Drives the machine through realistic event sequences against the mock
//! broker and checks observable outcomes: state, published payloads and the
//! fate of every client handle.


use proptest::prelude::*;
use test_helpers::{drain, test_machine};
use tick_publisher::publisher::{
    ClientToken, ConnectionState, ConnectionStateMachine, PublisherEvent, StepOutcome,
};
use tick_publisher::testing::mocks::{ConnectBehavior, MockBroker};

fn connect(machine: &mut ConnectionStateMachine<MockBroker>) -> ClientToken {
    machine.handle(PublisherEvent::NetworkUp);
    machine.handle(PublisherEvent::Tick(0));
    let token = machine.handle_token().expect("connect should create a client");
    machine.handle(PublisherEvent::ClientReady(token));
    assert_eq!(machine.state(), ConnectionState::Connected);
    token
}

#[test]
fn test_publish_until_failure_then_regress() {
    let (mut machine, broker, _events) = test_machine(ConnectBehavior::Silent);

    machine.handle(PublisherEvent::NetworkUp);
    machine.handle(PublisherEvent::Tick(50));
    assert_eq!(machine.state(), ConnectionState::ConnectionRequested);

    let token = machine.handle_token().unwrap();
    machine.handle(PublisherEvent::ClientReady(token));
    assert_eq!(machine.state(), ConnectionState::Connected);

    let step = machine.handle(PublisherEvent::Tick(100));
    assert!(matches!(step.outcome, StepOutcome::Published(_)));
    assert_eq!(machine.state(), ConnectionState::Connected);

    broker.fail_next_publish();
    machine.handle(PublisherEvent::Tick(150));

    assert_eq!(machine.state(), ConnectionState::NetworkUp);
    assert!(!machine.has_handle());
    assert_eq!(broker.finalized(), vec![token]);

    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "bathos-jiffies");
    assert_eq!(published[0].payload, b"00000100");
}

#[test]
fn test_connect_failure_is_retried_next_tick() {
    let (mut machine, broker, _events) = test_machine(ConnectBehavior::Silent);

    machine.handle(PublisherEvent::NetworkUp);
    broker.fail_next_initialize();
    let step = machine.handle(PublisherEvent::Tick(1));
    assert!(matches!(step.outcome, StepOutcome::Recovered(_)));
    assert_eq!(machine.state(), ConnectionState::NetworkUp);
    assert!(!machine.has_handle());

    machine.handle(PublisherEvent::Tick(2));
    assert_eq!(machine.state(), ConnectionState::ConnectionRequested);
    assert_eq!(broker.initialize_calls(), 2);
}

#[test]
fn test_network_down_while_connected_resets() {
    let (mut machine, broker, _events) = test_machine(ConnectBehavior::Silent);
    let token = connect(&mut machine);

    let step = machine.handle(PublisherEvent::NetworkDown);
    assert!(matches!(
        step.outcome,
        StepOutcome::LinkDown { discarded: Some(t) } if t == token
    ));
    assert_eq!(machine.state(), ConnectionState::WaitingForNetwork);
    assert!(!machine.has_handle());
    // Dropped without a goodbye
    assert!(broker.finalized().is_empty());
    assert_eq!(broker.dropped(), vec![token]);

    // Ticks do nothing until the link returns
    machine.handle(PublisherEvent::Tick(500));
    assert_eq!(broker.initialize_calls(), 1);
}

#[test]
fn test_unbounded_wait_for_connect_result() {
    let (mut machine, broker, _events) = test_machine(ConnectBehavior::Silent);
    machine.handle(PublisherEvent::NetworkUp);
    machine.handle(PublisherEvent::Tick(0));

    for ticks in 1..1000 {
        let step = machine.handle(PublisherEvent::Tick(ticks));
        assert!(matches!(step.outcome, StepOutcome::Idle));
    }
    assert_eq!(machine.state(), ConnectionState::ConnectionRequested);
    assert_eq!(broker.initialize_calls(), 1);
    assert!(broker.published().is_empty());
}

#[test]
fn test_refused_connection_round_trip_through_queue() {
    let (mut machine, broker, mut events) = test_machine(ConnectBehavior::Refuse);
    machine.handle(PublisherEvent::NetworkUp);
    machine.handle(PublisherEvent::Tick(0));

    for event in drain(&mut events) {
        machine.handle(event);
    }
    assert_eq!(machine.state(), ConnectionState::NetworkUp);
    assert_eq!(broker.finalized().len(), 1);

    broker.set_behavior(ConnectBehavior::Ready);
    machine.handle(PublisherEvent::Tick(1));
    for event in drain(&mut events) {
        machine.handle(event);
    }
    assert_eq!(machine.state(), ConnectionState::Connected);
}

#[test]
fn test_late_error_from_discarded_client_is_ignored() {
    let (mut machine, broker, _events) = test_machine(ConnectBehavior::Silent);
    let old = connect(&mut machine);
    machine.handle(PublisherEvent::NetworkDown);
    let fresh = connect(&mut machine);
    assert_ne!(old, fresh);

    let step = machine.handle(PublisherEvent::ClientError {
        token: old,
        reason: "socket closed".to_string(),
    });
    assert!(matches!(step.outcome, StepOutcome::Anomaly(_)));
    assert_eq!(machine.state(), ConnectionState::Connected);
    assert_eq!(machine.handle_token(), Some(fresh));
    assert!(broker.finalized().is_empty());
}

#[test]
fn test_client_id_passed_to_broker() {
    let (mut machine, broker, _events) = test_machine(ConnectBehavior::Silent);
    connect(&mut machine);

    let settings = broker.last_settings().unwrap();
    assert_eq!(settings.client_id.as_str(), "modulino- 4- 5- 6 ");
    assert_eq!(settings.keep_alive.as_secs(), 400);
    assert_eq!(settings.buffers.count, 2);
    assert_eq!(settings.buffers.size, 32);
}

fn arb_event() -> impl Strategy<Value = PublisherEvent> {
    prop_oneof![
        Just(PublisherEvent::NetworkUp),
        Just(PublisherEvent::NetworkDown),
        any::<u32>().prop_map(|ticks| PublisherEvent::Tick(u64::from(ticks))),
        (1u64..4).prop_map(|token| PublisherEvent::ClientReady(ClientToken(token))),
        (1u64..4).prop_map(|token| PublisherEvent::ClientError {
            token: ClientToken(token),
            reason: "random failure".to_string(),
        }),
    ]
}

proptest! {
    #[test]
    fn handle_only_held_while_connecting_or_connected(
        events in prop::collection::vec(arb_event(), 0..64),
        fail_publish in any::<bool>(),
    ) {
        let (mut machine, broker, _events) = test_machine(ConnectBehavior::Silent);
        if fail_publish {
            broker.fail_next_publish();
        }

        for event in events {
            let is_link_down = event == PublisherEvent::NetworkDown;
            machine.handle(event);

            let state = machine.state();
            prop_assert!(ConnectionState::ALL.contains(&state));
            if machine.has_handle() {
                prop_assert!(matches!(
                    state,
                    ConnectionState::ConnectionRequested | ConnectionState::Connected
                ));
            }
            if state == ConnectionState::Connected {
                prop_assert!(machine.has_handle());
            }
            if is_link_down {
                prop_assert_eq!(state, ConnectionState::WaitingForNetwork);
            }
        }

        // Every client ever created is either still held, finalized or dropped
        let created = broker.initialize_calls() as usize;
        let released = broker.finalized().len() + broker.dropped().len();
        let held = usize::from(machine.has_handle());
        prop_assert_eq!(created, released + held);
    }

    #[test]
    fn only_network_up_leaves_waiting(event in arb_event()) {
        let (mut machine, _broker, _events) = test_machine(ConnectBehavior::Silent);
        let is_up = event == PublisherEvent::NetworkUp;
        machine.handle(event);
        if is_up {
            prop_assert_eq!(machine.state(), ConnectionState::NetworkUp);
        } else {
            prop_assert_eq!(machine.state(), ConnectionState::WaitingForNetwork);
        }
    }
}
