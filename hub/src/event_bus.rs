//! Live event fan-out. Every write the Store performs is published here so
//! subscribed clients (the HTTP live-event endpoint, tests) observe it in
//! commit order. A slow subscriber falls behind rather than blocking
//! writers; lag is surfaced as its own event instead of silently dropped.

use crate::store::models::{AlertRecord, NodeRecord, SpectrogramRecord};
use serde::Serialize;
use tokio::sync::broadcast;

/// Bounded per-subscriber buffer. Sized to absorb a burst of reassembly
/// completions without a live dashboard tripping the lag path.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum HubEvent {
    NewNode(NodeRecord),
    NodeUpdate(NodeRecord),
    NewSpectrogram(SpectrogramRecord),
    NewAlert(AlertRecord),
    SpectrogramAnalyzed(SpectrogramRecord),
    SessionAbandoned { node_hash: u16, session_id: u16, received: usize, expected: Option<u8> },
    DecodeFailed { node_hash: u16, session_id: u16, error: String, raw: Vec<u8> },
    SyncCompleted { synced: u32, failed: u32 },
    SubscriberLag { skipped: u64 },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HubEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: HubEvent) {
        match self.sender.send(event) {
            Ok(_subscriber_count) => {}
            Err(_) => {
                // No subscribers currently attached; nothing to deliver.
            }
        }
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
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(HubEvent::SyncCompleted { synced: 3, failed: 0 });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, HubEvent::SyncCompleted { synced: 3, failed: 0 }));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(HubEvent::SyncCompleted { synced: 0, failed: 0 });
    }
}
