use roadbuddy_core::EventSink;
use roadbuddy_shared::LifecycleEvent;
use tokio::sync::broadcast;

/// In-process fan-out of lifecycle events to live subscribers (SSE streams).
/// Slow subscribers lose the oldest events rather than blocking emitters.
pub struct BroadcastEventSink {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let sink = BroadcastEventSink::new(16);
        let mut rx = sink.subscribe();
        let trip_id = Uuid::new_v4();

        sink.emit(LifecycleEvent::StatusChanged {
            trip_id,
            from: "active".into(),
            to: "full".into(),
            at: Utc::now(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.trip_id(), trip_id);
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let sink = BroadcastEventSink::new(1);
        sink.emit(LifecycleEvent::StatusChanged {
            trip_id: Uuid::new_v4(),
            from: "active".into(),
            to: "cancelled".into(),
            at: Utc::now(),
        });
    }
}
