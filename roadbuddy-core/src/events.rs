use roadbuddy_shared::LifecycleEvent;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives lifecycle notifications. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

/// Discards every event.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: LifecycleEvent) {}
}

/// Forwards each event to every inner sink.
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: LifecycleEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

/// Keeps every event in memory; used by tests and local tooling.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(RecordingEventSink::new());
        let b = Arc::new(RecordingEventSink::new());
        let sinks: Vec<Arc<dyn EventSink>> = vec![a.clone(), b.clone(), Arc::new(NoopEventSink)];
        let fanout = FanoutEventSink::new(sinks);

        fanout.emit(LifecycleEvent::StatusChanged {
            trip_id: Uuid::new_v4(),
            from: "active".into(),
            to: "cancelled".into(),
            at: Utc::now(),
        });

        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }
}
