//! Change events published to presentation surfaces.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{ConnectionStatus, NotificationKind, QueueSnapshot};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeEvent {
    ConnectionChanged {
        status: ConnectionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
    Notification {
        kind: NotificationKind,
        message: String,
    },
    ScanProgress {
        scanned: usize,
        total: usize,
    },
    QueueChanged(QueueSnapshot),
}

/// Broadcast fan-out to any number of listeners.
///
/// Publishing with nobody listening is fine; the event is dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: BridgeEvent) {
        if self.tx.send(event).is_err() {
            debug!("No listeners for bridge event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
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

    #[test]
    fn test_publish_without_listeners() {
        let bus = EventBus::new();
        assert_eq!(bus.listener_count(), 0);
        bus.publish(BridgeEvent::ScanProgress {
            scanned: 5,
            total: 15,
        });
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(BridgeEvent::ConnectionChanged {
            status: ConnectionStatus::Connected,
            port: Some(9090),
        });

        match rx.recv().await.unwrap() {
            BridgeEvent::ConnectionChanged { status, port } => {
                assert_eq!(status, ConnectionStatus::Connected);
                assert_eq!(port, Some(9090));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(BridgeEvent::Notification {
            kind: NotificationKind::Disconnected,
            message: "Lost connection".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "notification");
        assert_eq!(json["kind"], "disconnected");
    }
}
