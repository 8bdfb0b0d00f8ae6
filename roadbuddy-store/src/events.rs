use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use roadbuddy_core::EventSink;
use roadbuddy_shared::LifecycleEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Publishes lifecycle events to Kafka from a background task, keyed by
/// trip so one trip's events stay ordered within a partition.
pub struct KafkaEventSink {
    queue: mpsc::UnboundedSender<LifecycleEvent>,
}

impl KafkaEventSink {
    pub fn start(producer: EventProducer) -> (Self, JoinHandle<()>) {
        let (queue, mut events) = mpsc::unbounded_channel::<LifecycleEvent>();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Could not serialize {} event: {}", event.topic(), e);
                        continue;
                    }
                };
                let key = event.trip_id().to_string();
                // Delivery failures are logged by publish; events are best effort.
                let _ = producer.publish(event.topic(), &key, &payload).await;
            }
        });
        (Self { queue }, handle)
    }
}

impl EventSink for KafkaEventSink {
    fn emit(&self, event: LifecycleEvent) {
        if self.queue.send(event).is_err() {
            warn!("Kafka publisher stopped; dropping event");
        }
    }
}
