//! `async-nats` JetStream implementation of [`JobBus`]. Streams are
//! created (or adopted if already present) on connect; subjects and
//! retention follow `backplane_bus::streams` and `JobBusConfig`.

use std::time::Duration;

use async_nats::jetstream::{self, consumer::pull, context::Context as JsContext, stream::RetentionPolicy, AckKind};
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::bus::{Ackable, Delivery, JobBus, JobBusConfig, ProgressSubscription, PublishAck, QueueInfo};
use crate::error::{BusError, BusResult};
use crate::streams::{self, Pipeline};

pub struct NatsJobBus {
    client: async_nats::Client,
    js: JsContext,
    config: JobBusConfig,
}

impl NatsJobBus {
    pub async fn connect(url: &str, config: JobBusConfig) -> BusResult<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        let js = jetstream::new(client.clone());
        let bus = Self { client, js, config };
        bus.ensure_streams().await?;
        Ok(bus)
    }

    async fn ensure_streams(&self) -> BusResult<()> {
        for (name, max_age) in [
            (streams::TRANSCODE_JOBS, self.config.stream_retention),
            (streams::SUBTITLE_JOBS, self.config.stream_retention),
            (streams::WARM_CACHE_JOBS, self.config.stream_retention),
            (streams::REEL_JOBS, self.config.stream_retention),
            (streams::GALLERY_JOBS, self.config.stream_retention),
            (streams::JOBS_DLQ, self.config.dlq_retention),
        ] {
            self.js
                .get_or_create_stream(jetstream::stream::Config {
                    name: name.to_string(),
                    subjects: vec![format!("{name_lower}.>", name_lower = name.to_lowercase())],
                    retention: RetentionPolicy::WorkQueue,
                    max_age,
                    ..Default::default()
                })
                .await
                .map_err(|e| BusError::Connect(e.to_string()))?;
        }
        self.js
            .create_key_value(jetstream::kv::Config {
                bucket: streams::WORKER_STATUS_BUCKET.to_string(),
                max_age: Duration::from_secs(90),
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Kv(e.to_string()))?;
        Ok(())
    }

    async fn consumer_for(&self, stream_name: &str, durable: &str) -> BusResult<jetstream::consumer::Consumer<pull::Config>> {
        let stream = self
            .js
            .get_stream(stream_name)
            .await
            .map_err(|e| BusError::Fetch(e.to_string()))?;
        stream
            .get_or_create_consumer(
                durable,
                pull::Config {
                    durable_name: Some(durable.to_string()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    max_deliver: self.config.max_deliver,
                    ack_wait: self.config.ack_wait,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Fetch(e.to_string()))
    }

    async fn fetch_from(&self, stream_name: &'static str, durable: &str, batch: usize, wait: Duration) -> BusResult<Vec<Delivery>> {
        let consumer = self.consumer_for(stream_name, durable).await?;
        let mut messages = consumer
            .batch()
            .max_messages(batch)
            .expires(wait)
            .messages()
            .await
            .map_err(|e| BusError::Fetch(e.to_string()))?;

        let mut out = Vec::with_capacity(batch);
        while let Some(msg) = messages.next().await {
            let msg = msg.map_err(|e| BusError::Fetch(e.to_string()))?;
            let info = msg.info().map_err(|e| BusError::Fetch(e.to_string()))?;
            let delivery_count = info.delivered;
            let stream_seq = info.stream_sequence;
            let payload = msg.payload.to_vec();
            let (_msg, ack_sub) = msg.split();
            out.push(Delivery::new(
                payload,
                delivery_count.try_into().unwrap_or(0),
                stream_seq,
                Box::new(NatsAckable { ack_sub }),
            ));
        }
        Ok(out)
    }
}

struct NatsAckable {
    ack_sub: jetstream::message::Acker,
}

#[async_trait]
impl Ackable for NatsAckable {
    async fn ack(&self) -> BusResult<()> {
        self.ack_sub.ack().await.map_err(|e| BusError::Ack(e.to_string()))
    }

    async fn nack_with_delay(&self, delay: Duration) -> BusResult<()> {
        self.ack_sub
            .ack_with(AckKind::Nak(Some(delay)))
            .await
            .map_err(|e| BusError::Ack(e.to_string()))
    }
}

struct NatsProgressSubscription {
    inner: async_nats::Subscriber,
}

#[async_trait]
impl ProgressSubscription for NatsProgressSubscription {
    async fn next(&mut self) -> Option<Vec<u8>> {
        self.inner.next().await.map(|m| m.payload.to_vec())
    }
}

#[async_trait]
impl JobBus for NatsJobBus {
    async fn publish_job(&self, pipeline: Pipeline, payload: Vec<u8>) -> BusResult<PublishAck> {
        let subject = format!("{}.{}", pipeline.stream_name().to_lowercase(), pipeline.subject());
        let ack = self
            .js
            .publish(subject, payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(PublishAck {
            stream_seq: ack.sequence,
            stream_name: pipeline.stream_name(),
        })
    }

    async fn fetch(&self, pipeline: Pipeline, batch: usize, wait: Duration) -> BusResult<Vec<Delivery>> {
        let durable = format!("{}-worker", pipeline.subject().replace('.', "-"));
        self.fetch_from(pipeline.stream_name(), &durable, batch, wait).await
    }

    async fn publish_dlq(&self, payload: Vec<u8>) -> BusResult<PublishAck> {
        let subject = format!("{}.record", streams::JOBS_DLQ.to_lowercase());
        let ack = self
            .js
            .publish(subject, payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(PublishAck {
            stream_seq: ack.sequence,
            stream_name: streams::JOBS_DLQ,
        })
    }

    async fn fetch_dlq(&self, batch: usize, wait: Duration) -> BusResult<Vec<Delivery>> {
        self.fetch_from(streams::JOBS_DLQ, "dlq-notifier", batch, wait).await
    }

    async fn publish_progress(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    async fn subscribe_progress(&self, subject_pattern: &str) -> BusResult<Box<dyn ProgressSubscription>> {
        let sub = self
            .client
            .subscribe(subject_pattern.to_string())
            .await
            .map_err(|e| BusError::Fetch(e.to_string()))?;
        Ok(Box::new(NatsProgressSubscription { inner: sub }))
    }

    async fn queue_info(&self, pipeline: Pipeline) -> BusResult<QueueInfo> {
        let durable = format!("{}-worker", pipeline.subject().replace('.', "-"));
        let mut consumer = self.consumer_for(pipeline.stream_name(), &durable).await?;
        let info = consumer
            .info()
            .await
            .map_err(|e| BusError::QueueInfo(e.to_string()))?;
        let stream = self
            .js
            .get_stream(pipeline.stream_name())
            .await
            .map_err(|e| BusError::QueueInfo(e.to_string()))?;
        let stream_info = stream.cached_info();
        let last_sequence = stream_info.state.last_sequence;
        let pending = info.num_pending;
        Ok(QueueInfo {
            pending,
            ack_pending: info.num_ack_pending as u64,
            completed: last_sequence.saturating_sub(pending),
        })
    }

    async fn put_worker_status(&self, worker_id: &str, payload: Vec<u8>) -> BusResult<()> {
        let kv = self
            .js
            .get_key_value(streams::WORKER_STATUS_BUCKET)
            .await
            .map_err(|e| BusError::Kv(e.to_string()))?;
        kv.put(worker_id, payload.into())
            .await
            .map_err(|e| BusError::Kv(e.to_string()))?;
        Ok(())
    }

    async fn get_worker_status(&self, worker_id: &str) -> BusResult<Option<Vec<u8>>> {
        let kv = self
            .js
            .get_key_value(streams::WORKER_STATUS_BUCKET)
            .await
            .map_err(|e| BusError::Kv(e.to_string()))?;
        let value = kv.get(worker_id).await.map_err(|e| BusError::Kv(e.to_string()))?;
        Ok(value.map(|b| b.to_vec()))
    }

    async fn delete_worker_status(&self, worker_id: &str) -> BusResult<()> {
        let kv = self
            .js
            .get_key_value(streams::WORKER_STATUS_BUCKET)
            .await
            .map_err(|e| BusError::Kv(e.to_string()))?;
        kv.delete(worker_id).await.map_err(|e| BusError::Kv(e.to_string()))?;
        Ok(())
    }
}
