//! Impure I/O operations for the MQTT client
//!
//! This module owns the rumqttc client and the task that drives its event
//! loop. Connection outcomes are reported back into the publisher's event
//! queue; nothing here blocks the caller.

use super::connection::{configure_mqtt_options, publish_frame_len, to_rumqttc_qos, MqttError};
use super::message_handler::{EventRoute, MessageHandler};
use bytes::Bytes;
use crate::mqtt_span;
use crate::publisher::{ClientToken, EventSender};
use crate::transport::{BrokerClient, ClientHandle, ClientSettings, QoS};
use rumqttc::v5::{AsyncClient, EventLoop};
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Time a finalized client gets to flush its DISCONNECT before the event
/// loop task is aborted
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Creates rumqttc clients for the connection state machine
#[derive(Debug, Default)]
pub struct MqttBroker {
    next_token: u64,
}

impl MqttBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_token(&mut self) -> ClientToken {
        self.next_token += 1;
        ClientToken(self.next_token)
    }
}

/// A live rumqttc client and the task polling its event loop
pub struct MqttHandle {
    token: ClientToken,
    client: AsyncClient,
    event_loop_task: Option<JoinHandle<()>>,
    frame_limit: usize,
}

impl fmt::Debug for MqttHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttHandle")
            .field("token", &self.token)
            .field("frame_limit", &self.frame_limit)
            .field("running", &self.event_loop_task.is_some())
            .finish()
    }
}

impl ClientHandle for MqttHandle {
    fn token(&self) -> ClientToken {
        self.token
    }
}

impl Drop for MqttHandle {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}

impl BrokerClient for MqttBroker {
    type Handle = MqttHandle;
    type Error = MqttError;

    fn initialize(
        &mut self,
        settings: &ClientSettings,
        notifier: EventSender,
    ) -> Result<MqttHandle, MqttError> {
        let span = mqtt_span!(operation = "initialize", client_id = %settings.client_id);
        let _guard = span.enter();

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MqttError::NoRuntime)?;
        let mqtt_options = configure_mqtt_options(settings)?;

        let token = self.allocate_token();
        let (client, event_loop) = AsyncClient::new(mqtt_options, settings.buffers.count);

        info!(
            token = %token,
            client_id = %settings.client_id,
            broker = %settings.broker,
            "Starting MQTT client"
        );
        let event_loop_task = runtime.spawn(drive_event_loop(event_loop, token, notifier));

        Ok(MqttHandle {
            token,
            client,
            event_loop_task: Some(event_loop_task),
            frame_limit: settings.buffers.size,
        })
    }

    fn publish(
        &mut self,
        handle: &MqttHandle,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> Result<(), MqttError> {
        let span = mqtt_span!(operation = "publish", token = %handle.token, topic = %topic);
        let _guard = span.enter();

        let packet_id_len = if qos == QoS::AtMostOnce { 0 } else { 2 };
        let frame = publish_frame_len(topic, payload.len()) + packet_id_len;
        if frame > handle.frame_limit {
            return Err(MqttError::FrameTooLarge {
                frame,
                limit: handle.frame_limit,
            });
        }

        handle
            .client
            .try_publish(
                topic.to_string(),
                to_rumqttc_qos(qos),
                false,
                Bytes::copy_from_slice(payload),
            )
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }

    fn finalize(&mut self, mut handle: MqttHandle) {
        let Some(task) = handle.event_loop_task.take() else {
            return;
        };

        if let Err(e) = handle.client.try_disconnect() {
            debug!(token = %handle.token, error = %e, "Disconnect not queued, aborting event loop");
            task.abort();
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let mut task = task;
                    if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                        task.abort();
                    }
                });
            }
            Err(_) => task.abort(),
        }
        debug!(token = %handle.token, "MQTT client finalized");
    }
}

/// Poll the event loop until the connection ends, forwarding outcomes
async fn drive_event_loop(mut event_loop: EventLoop, token: ClientToken, notifier: EventSender) {
    loop {
        let route = match event_loop.poll().await {
            Ok(event) => MessageHandler::route_mqtt_event(&event),
            Err(e) => MessageHandler::route_connection_error(&e),
        };

        match &route {
            EventRoute::ConnectionAcknowledged => {
                info!(token = %token, "MQTT connection acknowledged");
            }
            EventRoute::ConnectionRefused(reason) => {
                warn!(token = %token, reason = %reason, "MQTT connection refused");
            }
            EventRoute::Disconnected(reason) => {
                warn!(token = %token, reason = %reason, "MQTT broker disconnected");
            }
            EventRoute::ConnectionLost(reason) => {
                warn!(token = %token, reason = %reason, "MQTT connection lost");
            }
            EventRoute::DisconnectSent => {
                debug!(token = %token, "MQTT disconnect sent");
            }
            EventRoute::InfrastructureEvent(event) => {
                debug!(target: "mqtt_transport", token = %token, "MQTT event: {}", event);
            }
            EventRoute::OutgoingEvent => {}
        }

        if let Some(notification) = MessageHandler::client_notification(&route, token) {
            notifier.send(notification);
        }

        if MessageHandler::is_terminal(&route) || notifier.is_closed() {
            break;
        }
    }
    debug!(token = %token, "MQTT event loop stopped");
}
