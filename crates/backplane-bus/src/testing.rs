//! In-memory `JobBus` fake for unit and integration tests, avoiding a
//! real NATS server in the test suite. Pipeline streams are plain
//! `VecDeque`s; redelivery cap enforcement is left to the consumer
//! runtime (it reads `Delivery::delivery_count`), matching how the real
//! bus never auto-routes to the DLQ stream either.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};

use crate::bus::{Ackable, Delivery, JobBus, ProgressSubscription, PublishAck, QueueInfo};
use crate::error::BusResult;
use crate::streams::{self, Pipeline};

struct QueuedMessage {
    payload: Vec<u8>,
    delivery_count: u64,
}

#[derive(Default)]
struct StreamState {
    queue: Mutex<VecDeque<QueuedMessage>>,
    last_sequence: AtomicU64,
}

/// An in-process stand-in for the job bus. Cheap to construct per test;
/// `Arc<InMemoryJobBus>` can be shared across simulated workers.
pub struct InMemoryJobBus {
    streams: DashMap<&'static str, Arc<StreamState>>,
    progress: broadcast::Sender<(String, Vec<u8>)>,
    kv: DashMap<String, Vec<u8>>,
}

impl Default for InMemoryJobBus {
    fn default() -> Self {
        let (progress, _) = broadcast::channel(1024);
        Self {
            streams: DashMap::new(),
            progress,
            kv: DashMap::new(),
        }
    }
}

impl InMemoryJobBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&self, name: &'static str) -> Arc<StreamState> {
        self.streams.entry(name).or_insert_with(|| Arc::new(StreamState::default())).clone()
    }

    async fn push(&self, name: &'static str, payload: Vec<u8>) -> PublishAck {
        let stream = self.stream(name);
        let seq = stream.last_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        stream.queue.lock().await.push_back(QueuedMessage { payload, delivery_count: 0 });
        PublishAck {
            stream_seq: seq,
            stream_name: name,
        }
    }

    async fn pop(&self, name: &'static str, batch: usize) -> Vec<Delivery> {
        let stream = self.stream(name);
        let mut queue = stream.queue.lock().await;
        let mut out = Vec::new();
        for _ in 0..batch {
            let Some(mut msg) = queue.pop_front() else { break };
            msg.delivery_count += 1;
            let delivery_count = msg.delivery_count;
            out.push(Delivery::new(
                msg.payload.clone(),
                delivery_count,
                0,
                Box::new(InMemoryAckable {
                    stream: stream.clone(),
                    payload: msg.payload,
                    delivery_count,
                }),
            ));
        }
        out
    }
}

struct InMemoryAckable {
    stream: Arc<StreamState>,
    payload: Vec<u8>,
    delivery_count: u64,
}

#[async_trait]
impl Ackable for InMemoryAckable {
    async fn ack(&self) -> BusResult<()> {
        Ok(())
    }

    async fn nack_with_delay(&self, _delay: Duration) -> BusResult<()> {
        self.stream.queue.lock().await.push_back(QueuedMessage {
            payload: self.payload.clone(),
            delivery_count: self.delivery_count,
        });
        Ok(())
    }
}

struct InMemoryProgressSubscription {
    inner: broadcast::Receiver<(String, Vec<u8>)>,
    subject_prefix: String,
}

#[async_trait]
impl ProgressSubscription for InMemoryProgressSubscription {
    async fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.inner.recv().await {
                Ok((subject, payload)) if subject.starts_with(&self.subject_prefix) => return Some(payload),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
impl JobBus for InMemoryJobBus {
    async fn publish_job(&self, pipeline: Pipeline, payload: Vec<u8>) -> BusResult<PublishAck> {
        Ok(self.push(pipeline.stream_name(), payload).await)
    }

    async fn fetch(&self, pipeline: Pipeline, batch: usize, _wait: Duration) -> BusResult<Vec<Delivery>> {
        Ok(self.pop(pipeline.stream_name(), batch).await)
    }

    async fn publish_dlq(&self, payload: Vec<u8>) -> BusResult<PublishAck> {
        Ok(self.push(streams::JOBS_DLQ, payload).await)
    }

    async fn fetch_dlq(&self, batch: usize, _wait: Duration) -> BusResult<Vec<Delivery>> {
        Ok(self.pop(streams::JOBS_DLQ, batch).await)
    }

    async fn publish_progress(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        let _ = self.progress.send((subject.to_string(), payload));
        Ok(())
    }

    async fn subscribe_progress(&self, subject_pattern: &str) -> BusResult<Box<dyn ProgressSubscription>> {
        let prefix = subject_pattern.trim_end_matches(['*', '>']).to_string();
        Ok(Box::new(InMemoryProgressSubscription {
            inner: self.progress.subscribe(),
            subject_prefix: prefix,
        }))
    }

    async fn queue_info(&self, pipeline: Pipeline) -> BusResult<QueueInfo> {
        let stream = self.stream(pipeline.stream_name());
        let pending = stream.queue.lock().await.len() as u64;
        let last_sequence = stream.last_sequence.load(Ordering::SeqCst);
        Ok(QueueInfo {
            pending,
            ack_pending: 0,
            completed: last_sequence.saturating_sub(pending),
        })
    }

    async fn put_worker_status(&self, worker_id: &str, payload: Vec<u8>) -> BusResult<()> {
        self.kv.insert(worker_id.to_string(), payload);
        Ok(())
    }

    async fn get_worker_status(&self, worker_id: &str) -> BusResult<Option<Vec<u8>>> {
        Ok(self.kv.get(worker_id).map(|v| v.clone()))
    }

    async fn delete_worker_status(&self, worker_id: &str) -> BusResult<()> {
        self.kv.remove(worker_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_fetch_roundtrips_payload() {
        let bus = InMemoryJobBus::new();
        bus.publish_job(Pipeline::Transcode, b"job-1".to_vec()).await.unwrap();
        let delivered = bus.fetch(Pipeline::Transcode, 10, Duration::from_millis(1)).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload, b"job-1");
        assert_eq!(delivered[0].delivery_count, 1);
    }

    #[tokio::test]
    async fn nack_redelivers_with_incremented_count() {
        let bus = InMemoryJobBus::new();
        bus.publish_job(Pipeline::Transcode, b"job-1".to_vec()).await.unwrap();
        let first = bus.fetch(Pipeline::Transcode, 1, Duration::from_millis(1)).await.unwrap();
        first[0].nack_with_delay(Duration::from_millis(1)).await.unwrap();
        let second = bus.fetch(Pipeline::Transcode, 1, Duration::from_millis(1)).await.unwrap();
        assert_eq!(second[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn queue_info_reflects_completed_as_last_sequence_minus_pending() {
        let bus = InMemoryJobBus::new();
        bus.publish_job(Pipeline::Transcode, b"a".to_vec()).await.unwrap();
        bus.publish_job(Pipeline::Transcode, b"b".to_vec()).await.unwrap();
        let _ = bus.fetch(Pipeline::Transcode, 1, Duration::from_millis(1)).await.unwrap();
        let info = bus.queue_info(Pipeline::Transcode).await.unwrap();
        assert_eq!(info.pending, 1);
        assert_eq!(info.completed, 1);
    }

    #[tokio::test]
    async fn worker_status_kv_roundtrips() {
        let bus = InMemoryJobBus::new();
        bus.put_worker_status("w1", b"{}".to_vec()).await.unwrap();
        assert_eq!(bus.get_worker_status("w1").await.unwrap(), Some(b"{}".to_vec()));
        bus.delete_worker_status("w1").await.unwrap();
        assert_eq!(bus.get_worker_status("w1").await.unwrap(), None);
    }
}
