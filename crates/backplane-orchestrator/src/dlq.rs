//! DLQ Subscriber (C9, spec.md §4.9): a durable, explicit-ack consumer on
//! the dead-letter stream. Acks unconditionally, even on a malformed
//! record or a notifier failure, to avoid redelivery loops on notifier
//! outages (spec.md §4.9).

use std::sync::Arc;
use std::time::Duration;

use backplane_bus::JobBus;
use backplane_core::messages::DlqRecord;
use backplane_core::notifier::Notifier;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct DlqSubscriber {
    bus: Arc<dyn JobBus>,
    notifier: Arc<dyn Notifier>,
}

impl DlqSubscriber {
    pub fn new(bus: Arc<dyn JobBus>, notifier: Arc<dyn Notifier>) -> Self {
        Self { bus, notifier }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            match self.bus.fetch_dlq(10, Duration::from_secs(5)).await {
                Ok(deliveries) => {
                    for delivery in deliveries {
                        self.handle_one(&delivery.payload).await;
                        let _ = delivery.ack().await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "dlq fetch failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle_one(&self, payload: &[u8]) {
        let record: DlqRecord = match serde_json::from_slice(payload) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "unparseable dlq record, dropping");
                return;
            }
        };
        self.notifier.notify(&format_alert(&record)).await;
    }
}

fn format_alert(record: &DlqRecord) -> String {
    let entity_code = record
        .original_job
        .get("video_code")
        .or_else(|| record.original_job.get("reel_id"))
        .or_else(|| record.original_job.get("subtitle_id"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let truncated_error: String = record.error.chars().take(200).collect();
    format!(
        "job exhausted retries: entity={entity_code} stage={:?} attempts={} worker={} failed_at={} error={truncated_error}",
        record.stage, record.attempts, record.worker_id, record.failed_at
    )
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use backplane_bus::testing::InMemoryJobBus;
    use backplane_core::domain::ErrorStage;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, message: &str) {
            self.messages.lock().push(message.to_string());
        }
    }

    #[tokio::test]
    async fn exhausted_record_produces_exactly_one_alert() {
        let bus: Arc<dyn JobBus> = Arc::new(InMemoryJobBus::new());
        let record = DlqRecord {
            original_job: serde_json::json!({"video_code": "abc"}),
            error: "ffmpeg exit 1".to_string(),
            attempts: 3,
            worker_id: "w1".to_string(),
            failed_at: 1000,
            stage: ErrorStage::Transcode,
        };
        bus.publish_dlq(serde_json::to_vec(&record).unwrap()).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let subscriber = DlqSubscriber::new(bus, notifier.clone());

        let deliveries = subscriber.bus.fetch_dlq(10, Duration::from_millis(10)).await.unwrap();
        for delivery in &deliveries {
            subscriber.handle_one(&delivery.payload).await;
            delivery.ack().await.unwrap();
        }

        assert_eq!(notifier.messages.lock().len(), 1);
        assert!(notifier.messages.lock()[0].contains("abc"));
    }
}
