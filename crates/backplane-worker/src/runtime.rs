//! Consumer Runtime (C5, spec.md §4.5): a single claim/ack/progress/DLQ
//! loop shared by every pipeline, parameterized by a [`StageExecutor`]
//! that supplies only the stage body and the entity-specific persistence
//! calls. Heartbeats run on an independent `tokio::spawn`ed task, per
//! the Concurrency model in spec.md §5.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backplane_bus::{Delivery, JobBus, Pipeline};
use backplane_core::domain::ErrorStage;
use backplane_core::domain::worker_status::{RecentJob, WorkerKind, WorkerStatus};
use backplane_core::events::{EventPipeline, ProgressEvent, ProgressStatus};
use backplane_core::messages::DlqRecord;
use backplane_store::MetadataStore;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub fetch_batch: usize,
    pub fetch_wait: Duration,
    pub heartbeat_interval: Duration,
    pub retry_backoff: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fetch_batch: 5,
            fetch_wait: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(3),
            retry_backoff: Duration::from_secs(10),
        }
    }
}

/// Thin wrapper over the bus's progress publish, handed to stage
/// executors so they can report periodic progress without holding a
/// reference to the whole runtime.
#[derive(Clone)]
pub struct ProgressSender {
    bus: Arc<dyn JobBus>,
}

impl ProgressSender {
    pub fn new(bus: Arc<dyn JobBus>) -> Self {
        Self { bus }
    }

    pub async fn send(&self, event: &ProgressEvent) {
        let subject = event.subject();
        match serde_json::to_vec(event) {
            Ok(payload) => {
                if let Err(err) = self.bus.publish_progress(&subject, payload).await {
                    warn!(%subject, error = %err, "failed to publish progress event");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize progress event"),
        }
    }
}

/// Everything a pipeline needs to supply to the shared consumer loop.
/// `Job` is the wire shape decoded from the bus payload (see
/// `backplane_core::messages`); the executor's own methods translate
/// between that job and the metadata store's named conditional-update
/// calls, keeping `MetadataStore` itself free of pipeline-specific logic.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    type Job: DeserializeOwned + Send + Sync;

    fn pipeline(&self) -> Pipeline;
    fn error_stage(&self) -> ErrorStage;
    fn worker_kind(&self) -> WorkerKind;
    fn max_retries(&self, job: &Self::Job) -> u32;

    fn entity_code(&self, job: &Self::Job) -> String;
    fn video_id(&self, job: &Self::Job) -> String;
    fn video_code(&self, job: &Self::Job) -> String;

    /// Conditional entry into the processing state (spec.md §4.5 step 2).
    async fn begin(&self, job: &Self::Job, store: &dyn MetadataStore, now: chrono::DateTime<Utc>);

    /// Run the stage body, reporting progress through `progress`. The
    /// returned event becomes the `completed` progress broadcast and is
    /// also handed to `on_success` to persist.
    async fn run(&self, job: &Self::Job, progress: &ProgressSender) -> anyhow::Result<ProgressEvent>;

    async fn on_success(&self, job: &Self::Job, outcome: &ProgressEvent, store: &dyn MetadataStore);
    async fn on_retry(&self, job: &Self::Job, error: &str, worker_id: &str, attempt: u32, store: &dyn MetadataStore);
    async fn on_exhausted(&self, job: &Self::Job, error: &str, worker_id: &str, attempt: u32, store: &dyn MetadataStore);
}

fn failed_event(video_id: String, video_code: String, pipeline: EventPipeline, error: String) -> ProgressEvent {
    ProgressEvent {
        video_id,
        video_code,
        pipeline,
        status: ProgressStatus::Failed,
        stage: None,
        progress: 0,
        quality: None,
        message: None,
        error: Some(error),
        output_path: None,
        audio_path: None,
        worker_id: None,
        subtitle_id: None,
        current_language: None,
        reel_id: None,
        file_size: None,
    }
}

fn started_event(video_id: String, video_code: String, pipeline: EventPipeline, worker_id: String) -> ProgressEvent {
    ProgressEvent {
        video_id,
        video_code,
        pipeline,
        status: ProgressStatus::Processing,
        stage: None,
        progress: 0,
        quality: None,
        message: None,
        error: None,
        output_path: None,
        audio_path: None,
        worker_id: Some(worker_id),
        subtitle_id: None,
        current_language: None,
        reel_id: None,
        file_size: None,
    }
}

pub struct ConsumerRuntime<E: StageExecutor> {
    bus: Arc<dyn JobBus>,
    store: Arc<dyn MetadataStore>,
    worker_id: String,
    executor: E,
    config: RuntimeConfig,
    status: Arc<Mutex<WorkerStatus>>,
}

impl<E: StageExecutor> ConsumerRuntime<E> {
    pub fn new(bus: Arc<dyn JobBus>, store: Arc<dyn MetadataStore>, worker_id: impl Into<String>, executor: E, config: RuntimeConfig) -> Self {
        let worker_id = worker_id.into();
        let status = Arc::new(Mutex::new(WorkerStatus::new(worker_id.clone(), executor.worker_kind(), Utc::now())));
        Self {
            bus,
            store,
            worker_id,
            executor,
            config,
            status,
        }
    }

    /// Run the claim loop until `cancel` fires. An in-flight stage is not
    /// forcibly aborted (the stage body owns that cooperative check); the
    /// loop simply stops claiming new work and lets the current claim
    /// finish or nack on its own failure path.
    pub async fn run(&self, cancel: CancellationToken) {
        let heartbeat = self.spawn_heartbeat(cancel.clone());
        let progress = ProgressSender::new(self.bus.clone());

        while !cancel.is_cancelled() {
            let deliveries = match self.bus.fetch(self.executor.pipeline(), self.config.fetch_batch, self.config.fetch_wait).await {
                Ok(d) => d,
                Err(err) => {
                    warn!(error = %err, pipeline = ?self.executor.pipeline(), "fetch failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };
            for delivery in deliveries {
                self.handle_one(delivery, &progress).await;
            }
        }

        heartbeat.abort();
    }

    fn spawn_heartbeat(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let bus = self.bus.clone();
        let status = self.status.clone();
        let interval = self.config.heartbeat_interval;
        let worker_id = self.worker_id.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            while !cancel.is_cancelled() {
                ticker.tick().await;
                status.lock().touch(Utc::now());
                let snapshot = status.lock().clone();
                if let Ok(payload) = serde_json::to_vec(&snapshot) {
                    if let Err(err) = bus.put_worker_status(&worker_id, payload).await {
                        warn!(%worker_id, error = %err, "heartbeat write failed");
                    }
                }
            }
        })
    }

    async fn handle_one(&self, delivery: Delivery, progress: &ProgressSender) {
        let job: E::Job = match serde_json::from_slice(&delivery.payload) {
            Ok(job) => job,
            Err(err) => {
                warn!(error = %err, "unparseable job payload, routing to DLQ");
                self.route_to_dlq(&delivery, "unparseable").await;
                let _ = delivery.ack().await;
                return;
            }
        };

        let event_pipeline = self.executor.pipeline().as_event_pipeline();

        let now = Utc::now();
        self.executor.begin(&job, self.store.as_ref(), now).await;
        progress
            .send(&started_event(
                self.executor.video_id(&job),
                self.executor.video_code(&job),
                event_pipeline,
                self.worker_id.clone(),
            ))
            .await;

        match self.executor.run(&job, progress).await {
            Ok(outcome) => {
                progress.send(&outcome).await;
                self.executor.on_success(&job, &outcome, self.store.as_ref()).await;
                let _ = delivery.ack().await;
                self.record_finished(&self.executor.entity_code(&job), true);
            }
            Err(err) => {
                let attempt = delivery.delivery_count as u32;
                let max_retries = self.executor.max_retries(&job);
                let message = err.to_string();
                progress
                    .send(&failed_event(
                        self.executor.video_id(&job),
                        self.executor.video_code(&job),
                        event_pipeline,
                        message.clone(),
                    ))
                    .await;

                if attempt < max_retries {
                    self.executor.on_retry(&job, &message, &self.worker_id, attempt, self.store.as_ref()).await;
                    let _ = delivery.nack_with_delay(self.config.retry_backoff).await;
                } else {
                    self.executor.on_exhausted(&job, &message, &self.worker_id, attempt, self.store.as_ref()).await;
                    self.publish_dlq_record(&delivery, &message, attempt).await;
                    let _ = delivery.ack().await;
                }
                self.record_finished(&self.executor.entity_code(&job), false);
            }
        }
    }

    fn record_finished(&self, entity_code: &str, succeeded: bool) {
        let mut status = self.status.lock();
        if succeeded {
            status.lifetime.jobs_completed += 1;
        } else {
            status.lifetime.jobs_failed += 1;
        }
        status.push_recent(RecentJob {
            entity_code: entity_code.to_string(),
            stage: self.executor.pipeline().subject().to_string(),
            succeeded,
            finished_at: Utc::now(),
        });
    }

    async fn route_to_dlq(&self, delivery: &Delivery, reason: &str) {
        let original_job = serde_json::from_slice(&delivery.payload).unwrap_or(serde_json::Value::Null);
        let record = DlqRecord {
            original_job,
            error: reason.to_string(),
            attempts: delivery.delivery_count as u32,
            worker_id: self.worker_id.clone(),
            failed_at: Utc::now().timestamp(),
            stage: self.executor.error_stage(),
        };
        if let Ok(payload) = serde_json::to_vec(&record) {
            if let Err(err) = self.bus.publish_dlq(payload).await {
                warn!(error = %err, "failed to publish DLQ record");
            }
        }
    }

    async fn publish_dlq_record(&self, delivery: &Delivery, error: &str, attempts: u32) {
        let original_job = serde_json::from_slice(&delivery.payload).unwrap_or(serde_json::Value::Null);
        let record = DlqRecord {
            original_job,
            error: error.to_string(),
            attempts,
            worker_id: self.worker_id.clone(),
            failed_at: Utc::now().timestamp(),
            stage: self.executor.error_stage(),
        };
        if let Ok(payload) = serde_json::to_vec(&record) {
            if let Err(err) = self.bus.publish_dlq(payload).await {
                warn!(error = %err, "failed to publish DLQ record");
            } else {
                info!(attempts, pipeline = ?self.executor.pipeline(), "job exhausted retries, routed to DLQ");
            }
        }
    }
}
