//! Network link state monitoring
//!
//! The monitor polls a [`LinkProbe`] and turns changes in the observed link
//! state into `NetworkUp` / `NetworkDown` events. Only edges are reported;
//! the state machine starts out waiting for the network, so an initial
//! "down" observation produces nothing.

use crate::publisher::{EventSender, PublisherEvent};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info};

/// Reports whether the network link is currently usable
#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn is_up(&self) -> bool;
}

/// Link is considered up when a TCP connection to the target succeeds
#[derive(Debug, Clone)]
pub struct TcpLinkProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpLinkProbe {
    pub fn new<S: Into<String>>(host: S, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

#[async_trait]
impl LinkProbe for TcpLinkProbe {
    async fn is_up(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, port = self.port, error = %e, "Link probe failed");
                false
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "Link probe timed out");
                false
            }
        }
    }
}

/// Link that is always up, for hosts whose connectivity is managed elsewhere
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysUpProbe;

#[async_trait]
impl LinkProbe for AlwaysUpProbe {
    async fn is_up(&self) -> bool {
        true
    }
}

/// Last known link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Down,
    Up,
}

/// Polls a probe and emits link edges into the event queue
pub struct LinkMonitor<P: LinkProbe> {
    probe: P,
    interval: Duration,
    status: LinkStatus,
}

impl<P: LinkProbe> LinkMonitor<P> {
    pub fn new(probe: P, interval: Duration) -> Self {
        Self {
            probe,
            interval,
            status: LinkStatus::Down,
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Event to emit when `observed_up` is seen after `previous` (pure function)
    pub fn edge(previous: LinkStatus, observed_up: bool) -> Option<PublisherEvent> {
        match (previous, observed_up) {
            (LinkStatus::Down, true) => Some(PublisherEvent::NetworkUp),
            (LinkStatus::Up, false) => Some(PublisherEvent::NetworkDown),
            _ => None,
        }
    }

    /// Probe once and report an edge, if any
    pub async fn poll_once(&mut self, events: &EventSender) -> Option<LinkStatus> {
        let observed_up = self.probe.is_up().await;
        let event = Self::edge(self.status, observed_up)?;

        self.status = if observed_up {
            LinkStatus::Up
        } else {
            LinkStatus::Down
        };
        info!(status = ?self.status, "Link state changed");
        events.send(event);
        Some(self.status)
    }

    /// Poll until shutdown is requested or the event queue closes
    pub async fn run(mut self, events: EventSender, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "Starting link monitor");
        loop {
            self.poll_once(&events).await;
            if events.is_closed() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("Link monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::ScriptedLinkProbe;

    #[test]
    fn test_edges() {
        type Monitor = LinkMonitor<AlwaysUpProbe>;
        assert_eq!(
            Monitor::edge(LinkStatus::Down, true),
            Some(PublisherEvent::NetworkUp)
        );
        assert_eq!(
            Monitor::edge(LinkStatus::Up, false),
            Some(PublisherEvent::NetworkDown)
        );
        assert_eq!(Monitor::edge(LinkStatus::Up, true), None);
        assert_eq!(Monitor::edge(LinkStatus::Down, false), None);
    }

    #[tokio::test]
    async fn test_poll_reports_only_changes() {
        let probe = ScriptedLinkProbe::new([false, true, true, false, false, true]);
        let mut monitor = LinkMonitor::new(probe, Duration::from_millis(10));
        let (events, mut rx) = EventSender::channel();

        for _ in 0..6 {
            monitor.poll_once(&events).await;
        }
        drop(events);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                PublisherEvent::NetworkUp,
                PublisherEvent::NetworkDown,
                PublisherEvent::NetworkUp
            ]
        );
        assert_eq!(monitor.status(), LinkStatus::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let monitor = LinkMonitor::new(AlwaysUpProbe, Duration::from_millis(100));
        let (events, mut rx) = EventSender::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(monitor.run(events, shutdown_rx));
        assert_eq!(rx.recv().await, Some(PublisherEvent::NetworkUp));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_probe_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpLinkProbe::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(probe.is_up().await);

        drop(listener);
        let closed = TcpLinkProbe::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(!closed.is_up().await);
    }
}
