// Event bus — decouples platform callback code from consumers.
//
// Three surfaces with different delivery guarantees:
// - log lines: bounded broadcast, drop-oldest under pressure
// - typed notifications: bounded broadcast
// - disconnect events: unbounded mpsc, never dropped
//
// Log lines are mirrored to `tracing` so the same diagnostics reach
// structured logs.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::protocol::Command;

/// Broadcast buffer depth for logs and notifications. Laggy receivers
/// lose the oldest entries, not the newest.
const BROADCAST_CAPACITY: usize = 256;

/// A value decoded from a TX-characteristic notification (central side)
/// or surfaced from an inbound write (peripheral side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BleNotification {
    /// A recognized command byte
    Command(Command),
    /// An unrecognized CMD payload, published rather than silently dropped
    UnknownCommand(Vec<u8>),
    /// A stream data block
    Data(Vec<u8>),
}

/// A terminal link loss, with the platform codes that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectEvent {
    /// Platform status code of the callback
    pub status: i32,
    /// Platform new-state code of the callback
    pub new_state: i32,
}

struct BusInner {
    logs: broadcast::Sender<String>,
    notifications: broadcast::Sender<BleNotification>,
    disconnects_tx: mpsc::UnboundedSender<DisconnectEvent>,
    disconnects_rx: Mutex<Option<mpsc::UnboundedReceiver<DisconnectEvent>>>,
}

/// Multi-producer fan-out bus owned by a session. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        let (logs, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (notifications, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (disconnects_tx, disconnects_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(BusInner {
                logs,
                notifications,
                disconnects_tx,
                disconnects_rx: Mutex::new(Some(disconnects_rx)),
            }),
        }
    }

    /// Publish a diagnostic line. Lossy: with no subscribers, or with
    /// lagging subscribers, lines are dropped.
    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        debug!("{}", line);
        let _ = self.inner.logs.send(line);
    }

    /// Publish a decoded notification value.
    pub fn publish(&self, notification: BleNotification) {
        let _ = self.inner.notifications.send(notification);
    }

    /// Publish a disconnect event on the reliable path.
    pub fn publish_disconnect(&self, event: DisconnectEvent) {
        let _ = self.inner.disconnects_tx.send(event);
    }

    /// Subscribe to the log stream.
    pub fn subscribe_logs(&self) -> broadcast::Receiver<String> {
        self.inner.logs.subscribe()
    }

    /// Subscribe to the typed notification stream.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<BleNotification> {
        self.inner.notifications.subscribe()
    }

    /// Take the reliable disconnect receiver. Single consumer; returns
    /// `None` after the first call.
    pub fn take_disconnects(&self) -> Option<mpsc::UnboundedReceiver<DisconnectEvent>> {
        self.inner.disconnects_rx.lock().take()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_fanout() {
        let bus = EventBus::new();
        let mut rx_a = bus.subscribe_logs();
        let mut rx_b = bus.subscribe_logs();

        bus.log("advertising started");

        assert_eq!(rx_a.recv().await.unwrap(), "advertising started");
        assert_eq!(rx_b.recv().await.unwrap(), "advertising started");
    }

    #[tokio::test]
    async fn test_log_without_subscribers_is_dropped() {
        let bus = EventBus::new();
        // Must not panic or error
        bus.log("nobody listening");
    }

    #[tokio::test]
    async fn test_notification_stream() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_notifications();

        bus.publish(BleNotification::Command(Command::Pong));
        bus.publish(BleNotification::UnknownCommand(vec![0xFF]));

        assert_eq!(
            rx.recv().await.unwrap(),
            BleNotification::Command(Command::Pong)
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            BleNotification::UnknownCommand(vec![0xFF])
        );
    }

    #[tokio::test]
    async fn test_disconnects_are_reliable_and_ordered() {
        let bus = EventBus::new();
        let mut rx = bus.take_disconnects().expect("first take");

        // Published before anyone polls; must still arrive, in order
        bus.publish_disconnect(DisconnectEvent { status: 8, new_state: 0 });
        bus.publish_disconnect(DisconnectEvent { status: 19, new_state: 0 });

        assert_eq!(rx.recv().await.unwrap().status, 8);
        assert_eq!(rx.recv().await.unwrap().status, 19);
    }

    #[tokio::test]
    async fn test_disconnect_receiver_single_consumer() {
        let bus = EventBus::new();
        assert!(bus.take_disconnects().is_some());
        assert!(bus.take_disconnects().is_none());
    }
}
