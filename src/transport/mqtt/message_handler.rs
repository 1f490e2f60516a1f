//! Pure routing of MQTT event-loop output
//!
//! This module turns rumqttc events into routing decisions and maps those
//! decisions onto the publisher's client notifications.

use crate::publisher::{ClientToken, PublisherEvent};
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::{ConnectionError, Event};
use rumqttc::Outgoing;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => match connack.code {
                    ConnectReturnCode::Success => EventRoute::ConnectionAcknowledged,
                    code => EventRoute::ConnectionRefused(format!("{code:?}")),
                },
                Packet::Disconnect(disconnect) => {
                    EventRoute::Disconnected(format!("{:?}", disconnect.reason_code))
                }
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Route a failed event-loop poll (pure routing decision)
    pub fn route_connection_error(error: &ConnectionError) -> EventRoute {
        match error {
            ConnectionError::ConnectionRefused(code) => {
                EventRoute::ConnectionRefused(format!("{code:?}"))
            }
            other => EventRoute::ConnectionLost(other.to_string()),
        }
    }

    /// Notification the publisher should receive for a route (pure function)
    pub fn client_notification(route: &EventRoute, token: ClientToken) -> Option<PublisherEvent> {
        match route {
            EventRoute::ConnectionAcknowledged => Some(PublisherEvent::ClientReady(token)),
            EventRoute::ConnectionRefused(reason) => Some(PublisherEvent::ClientError {
                token,
                reason: format!("connection refused: {reason}"),
            }),
            EventRoute::Disconnected(reason) => Some(PublisherEvent::ClientError {
                token,
                reason: format!("broker disconnected: {reason}"),
            }),
            EventRoute::ConnectionLost(reason) => Some(PublisherEvent::ClientError {
                token,
                reason: reason.clone(),
            }),
            EventRoute::DisconnectSent
            | EventRoute::InfrastructureEvent(_)
            | EventRoute::OutgoingEvent => None,
        }
    }

    /// Whether the event loop should stop polling after this route (pure function)
    ///
    /// The state machine discards the client on any error and builds a new
    /// one, so the old event loop must not reconnect on its own.
    pub fn is_terminal(route: &EventRoute) -> bool {
        matches!(
            route,
            EventRoute::ConnectionRefused(_)
                | EventRoute::Disconnected(_)
                | EventRoute::ConnectionLost(_)
                | EventRoute::DisconnectSent
        )
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish
    ConnectionAcknowledged,
    /// Broker answered the connect with a failure code
    ConnectionRefused(String),
    /// Broker sent a DISCONNECT
    Disconnected(String),
    /// Network or protocol error while polling
    ConnectionLost(String),
    /// Our own DISCONNECT went out after the client was finalized
    DisconnectSent,
    /// Infrastructure event (PingResp, PubAck, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}
