//! Periodic tick publisher
//!
//! # Architecture
//!
//! - [`state`] - the four connection states
//! - [`events`] - the event type every signal source is funneled into
//! - [`client_id`] - hardware-address derived client identifiers
//! - [`payload`] - fixed-width tick payloads
//! - [`machine`] - the connection state machine
//!
//! ```rust
//! use tick_publisher::publisher::{ConnectionState, ConnectionStateMachine, EventSender, PublisherEvent};
//! use tick_publisher::testing::mocks::{test_publisher_settings, MockBroker};
//!
//! let (notifier, _events) = EventSender::channel();
//! let mut machine = ConnectionStateMachine::new(MockBroker::new(), test_publisher_settings(), notifier);
//!
//! machine.handle(PublisherEvent::NetworkUp);
//! machine.handle(PublisherEvent::Tick(1));
//! assert_eq!(machine.state(), ConnectionState::ConnectionRequested);
//! ```

pub mod client_id;
pub mod events;
pub mod machine;
pub mod payload;
pub mod state;

pub use client_id::{ClientId, ClientIdError, HardwareAddress};
pub use events::{ClientToken, EventReceiver, EventSender, PublisherEvent};
pub use machine::{ConnectionStateMachine, PublisherSettings, Step, StepOutcome};
pub use payload::TickPayload;
pub use state::ConnectionState;
