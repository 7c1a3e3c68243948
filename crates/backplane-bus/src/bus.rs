//! The Job Bus port. Durable, explicit-ack work-queue streams per
//! pipeline, an ephemeral `progress.*` pub/sub hierarchy, and a KV
//! bucket for worker heartbeats. `NatsJobBus` backs this with
//! `async-nats` JetStream; `backplane_bus::testing::InMemoryJobBus`
//! backs it for unit tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BusResult;
use crate::streams::Pipeline;

#[derive(Debug, Clone, Copy)]
pub struct JobBusConfig {
    pub max_deliver: i64,
    pub ack_wait: Duration,
    pub stream_retention: Duration,
    pub dlq_retention: Duration,
    pub fetch_batch: usize,
    pub fetch_wait: Duration,
}

impl Default for JobBusConfig {
    fn default() -> Self {
        Self {
            max_deliver: 3,
            ack_wait: Duration::from_secs(60),
            stream_retention: Duration::from_secs(24 * 3600),
            dlq_retention: Duration::from_secs(30 * 24 * 3600),
            fetch_batch: 10,
            fetch_wait: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueInfo {
    pub pending: u64,
    pub ack_pending: u64,
    pub completed: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct PublishAck {
    pub stream_seq: u64,
    pub stream_name: &'static str,
}

/// A single delivered message, carrying enough redelivery bookkeeping
/// for the consumer runtime's stage executors and an opaque handle back
/// to the bus for ack/nack.
pub struct Delivery {
    pub payload: Vec<u8>,
    pub delivery_count: u64,
    pub stream_seq: u64,
    handle: Box<dyn Ackable>,
}

impl Delivery {
    pub fn new(payload: Vec<u8>, delivery_count: u64, stream_seq: u64, handle: Box<dyn Ackable>) -> Self {
        Self {
            payload,
            delivery_count,
            stream_seq,
            handle,
        }
    }

    pub async fn ack(&self) -> BusResult<()> {
        self.handle.ack().await
    }

    pub async fn nack_with_delay(&self, delay: Duration) -> BusResult<()> {
        self.handle.nack_with_delay(delay).await
    }
}

#[async_trait]
pub trait Ackable: Send + Sync {
    async fn ack(&self) -> BusResult<()>;
    async fn nack_with_delay(&self, delay: Duration) -> BusResult<()>;
}

/// A subscription to an ephemeral progress subject; `next` returns raw
/// JSON payloads as they arrive, with no durability or replay.
#[async_trait]
pub trait ProgressSubscription: Send {
    async fn next(&mut self) -> Option<Vec<u8>>;
}

#[async_trait]
pub trait JobBus: Send + Sync {
    async fn publish_job(&self, pipeline: Pipeline, payload: Vec<u8>) -> BusResult<PublishAck>;
    async fn fetch(&self, pipeline: Pipeline, batch: usize, wait: Duration) -> BusResult<Vec<Delivery>>;

    async fn publish_dlq(&self, payload: Vec<u8>) -> BusResult<PublishAck>;
    async fn fetch_dlq(&self, batch: usize, wait: Duration) -> BusResult<Vec<Delivery>>;

    async fn publish_progress(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;
    async fn subscribe_progress(&self, subject_pattern: &str) -> BusResult<Box<dyn ProgressSubscription>>;

    async fn queue_info(&self, pipeline: Pipeline) -> BusResult<QueueInfo>;

    async fn put_worker_status(&self, worker_id: &str, payload: Vec<u8>) -> BusResult<()>;
    async fn get_worker_status(&self, worker_id: &str) -> BusResult<Option<Vec<u8>>>;
    async fn delete_worker_status(&self, worker_id: &str) -> BusResult<()>;
}
