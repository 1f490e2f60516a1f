//! Events that drive the connection state machine
//!
//! Every signal source (periodic timer, link monitor, broker client tasks)
//! funnels into one [`PublisherEvent`] queue. The runtime is the queue's only
//! consumer, so transitions never race.

use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Identifies one broker client instance across async notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientToken(pub u64);

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Input to the connection state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherEvent {
    /// Network link came up
    NetworkUp,
    /// Network link went down
    NetworkDown,
    /// Periodic timer fired; carries the scheduler tick count at firing time
    Tick(u64),
    /// Broker accepted the connection of the given client
    ClientReady(ClientToken),
    /// The given client failed (refused, dropped or transport error)
    ClientError { token: ClientToken, reason: String },
}

impl PublisherEvent {
    /// Short name used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            PublisherEvent::NetworkUp => "network_up",
            PublisherEvent::NetworkDown => "network_down",
            PublisherEvent::Tick(_) => "tick",
            PublisherEvent::ClientReady(_) => "client_ready",
            PublisherEvent::ClientError { .. } => "client_error",
        }
    }
}

/// Receiving half of the event queue, owned by the runtime
pub type EventReceiver = mpsc::UnboundedReceiver<PublisherEvent>;

/// Cloneable producer handle for the event queue
///
/// Sending never blocks. Once the runtime has stopped, events are dropped.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<PublisherEvent>,
}

impl EventSender {
    /// Create a new event queue
    pub fn channel() -> (EventSender, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender { tx }, rx)
    }

    pub fn send(&self, event: PublisherEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            debug!(event = kind, "Event queue closed, dropping event");
        }
    }

    pub fn network_up(&self) {
        self.send(PublisherEvent::NetworkUp);
    }

    pub fn network_down(&self) {
        self.send(PublisherEvent::NetworkDown);
    }

    pub fn client_ready(&self, token: ClientToken) {
        self.send(PublisherEvent::ClientReady(token));
    }

    pub fn client_error<S: Into<String>>(&self, token: ClientToken, reason: S) {
        self.send(PublisherEvent::ClientError {
            token,
            reason: reason.into(),
        });
    }

    /// Whether the consumer side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
