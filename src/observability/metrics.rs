//! Thread-safe metrics collection system
//!
//! Provides atomic counters for the publisher's connection lifecycle, publish
//! traffic and link transitions, plus a serializable snapshot.

use crate::publisher::ConnectionState;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and a mutex for the state
pub struct MetricsCollector {
    // Connection metrics
    mqtt_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    client_errors: AtomicU64,
    connection_start_time: AtomicU64,

    // Publish metrics
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    last_published_ticks: AtomicU64,

    // Link metrics
    link_ups: AtomicU64,
    link_downs: AtomicU64,
    handles_discarded: AtomicU64,

    // Lifecycle metrics
    publisher_state: Mutex<ConnectionState>,
    state_transitions: AtomicU64,
    anomalies: AtomicU64,
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            mqtt_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            client_errors: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            last_published_ticks: AtomicU64::new(0),
            link_ups: AtomicU64::new(0),
            link_downs: AtomicU64::new(0),
            handles_discarded: AtomicU64::new(0),
            publisher_state: Mutex::new(ConnectionState::default()),
            state_transitions: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // MQTT connection metrics
    pub fn mqtt_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Client creation failed before any connect was attempted
    pub fn mqtt_connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    /// The held client reported an asynchronous error
    pub fn mqtt_client_error(&self) {
        self.client_errors.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connection_lost();
    }

    pub fn mqtt_connection_lost(&self) {
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    // Publish metrics
    pub fn mqtt_message_published(&self, ticks: u64) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.last_published_ticks.store(ticks, Ordering::Relaxed);
    }

    pub fn mqtt_publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connection_lost();
    }

    // Link metrics
    pub fn link_up(&self) {
        self.link_ups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn link_down(&self, discarded_handle: bool) {
        self.link_downs.fetch_add(1, Ordering::Relaxed);
        if discarded_handle {
            self.handles_discarded.fetch_add(1, Ordering::Relaxed);
        }
        self.mqtt_connection_lost();
    }

    // Lifecycle metrics
    pub fn set_publisher_state(&self, state: ConnectionState) {
        if let Ok(mut current_state) = self.publisher_state.lock() {
            if *current_state != state {
                self.state_transitions.fetch_add(1, Ordering::Relaxed);
                *current_state = state;
            }
        }
    }

    pub fn anomaly(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset connection metrics (pure function)
    fn reset_connection_metrics(&self) {
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_attempts.store(0, Ordering::Relaxed);
        self.connections_established.store(0, Ordering::Relaxed);
        self.connection_failures.store(0, Ordering::Relaxed);
        self.client_errors.store(0, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    /// Reset publish and link metrics (pure function)
    fn reset_traffic_metrics(&self) {
        self.messages_published.store(0, Ordering::Relaxed);
        self.publish_failures.store(0, Ordering::Relaxed);
        self.last_published_ticks.store(0, Ordering::Relaxed);
        self.link_ups.store(0, Ordering::Relaxed);
        self.link_downs.store(0, Ordering::Relaxed);
        self.handles_discarded.store(0, Ordering::Relaxed);
    }

    /// Reset lifecycle metrics (pure function)
    fn reset_lifecycle_metrics(&self) {
        if let Ok(mut state) = self.publisher_state.lock() {
            *state = ConnectionState::default();
        }
        self.state_transitions.store(0, Ordering::Relaxed);
        self.anomalies.store(0, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        self.reset_connection_metrics();
        self.reset_traffic_metrics();
        self.reset_lifecycle_metrics();
    }

    /// Calculate connection duration (pure function)
    fn calculate_connection_duration(&self, now: u64) -> u64 {
        let start = self.connection_start_time.load(Ordering::Relaxed);
        if self.mqtt_connected.load(Ordering::Relaxed) && start > 0 {
            now.saturating_sub(start)
        } else {
            0
        }
    }

    fn current_state(&self) -> ConnectionState {
        self.publisher_state
            .lock()
            .map(|state| *state)
            .unwrap_or_default()
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();

        MetricsSnapshot {
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                client_errors: self.client_errors.load(Ordering::Relaxed),
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                last_published_ticks: self.last_published_ticks.load(Ordering::Relaxed),
                connection_duration_seconds: self.calculate_connection_duration(now),
            },
            link: LinkMetrics {
                link_ups: self.link_ups.load(Ordering::Relaxed),
                link_downs: self.link_downs.load(Ordering::Relaxed),
                handles_discarded: self.handles_discarded.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                current_state: self.current_state(),
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
                state_transitions: self.state_transitions.load(Ordering::Relaxed),
                anomalies: self.anomalies.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub mqtt: MqttMetrics,
    pub link: LinkMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct MqttMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub client_errors: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub last_published_ticks: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct LinkMetrics {
    pub link_ups: u64,
    pub link_downs: u64,
    pub handles_discarded: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub current_state: ConnectionState,
    pub uptime_seconds: u64,
    pub state_transitions: u64,
    pub anomalies: u64,
}

// Helper functions
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
