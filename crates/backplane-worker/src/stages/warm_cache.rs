use std::sync::Arc;

use async_trait::async_trait;
use backplane_bus::Pipeline;
use backplane_core::domain::worker_status::WorkerKind;
use backplane_core::domain::{CacheStatus, ErrorStage};
use backplane_core::events::{EventPipeline, ProgressEvent, ProgressStatus};
use backplane_core::messages::WarmCacheJob;
use backplane_store::MetadataStore;
use chrono::{DateTime, Utc};

use crate::ports::CdnWarmer;
use crate::runtime::{ProgressSender, StageExecutor};

pub struct WarmCacheExecutor {
    pub warmer: Arc<dyn CdnWarmer>,
    pub max_retries: u32,
}

#[async_trait]
impl StageExecutor for WarmCacheExecutor {
    type Job = WarmCacheJob;

    fn pipeline(&self) -> Pipeline {
        Pipeline::WarmCache
    }

    fn error_stage(&self) -> ErrorStage {
        ErrorStage::Transcode
    }

    fn worker_kind(&self) -> WorkerKind {
        WorkerKind::WarmCache
    }

    fn max_retries(&self, _job: &Self::Job) -> u32 {
        self.max_retries
    }

    fn entity_code(&self, job: &Self::Job) -> String {
        job.video_code.clone()
    }

    fn video_id(&self, job: &Self::Job) -> String {
        job.video_id.clone()
    }

    fn video_code(&self, job: &Self::Job) -> String {
        job.video_code.clone()
    }

    async fn begin(&self, job: &Self::Job, store: &dyn MetadataStore, _now: DateTime<Utc>) {
        let _ = store.update_video_cache_status(&job.video_id, CacheStatus::Warming, 0).await;
    }

    async fn run(&self, job: &Self::Job, progress: &ProgressSender) -> anyhow::Result<ProgressEvent> {
        let output = self.warmer.warm(&job.hls_path, &job.segment_counts, progress, &job.video_id, &job.video_code).await?;

        Ok(ProgressEvent {
            video_id: job.video_id.clone(),
            video_code: job.video_code.clone(),
            pipeline: EventPipeline::WarmCache,
            status: ProgressStatus::Completed,
            stage: None,
            progress: output.percent_warmed,
            quality: None,
            message: None,
            error: None,
            output_path: None,
            audio_path: None,
            worker_id: None,
            subtitle_id: None,
            current_language: None,
            reel_id: None,
            file_size: None,
        })
    }

    async fn on_success(&self, job: &Self::Job, outcome: &ProgressEvent, store: &dyn MetadataStore) {
        let _ = store.update_video_cache_status(&job.video_id, CacheStatus::Cached, outcome.progress).await;
    }

    async fn on_retry(&self, job: &Self::Job, _error: &str, _worker_id: &str, _attempt: u32, store: &dyn MetadataStore) {
        let _ = store.update_video_cache_status(&job.video_id, CacheStatus::Warming, 0).await;
    }

    async fn on_exhausted(&self, job: &Self::Job, _error: &str, _worker_id: &str, _attempt: u32, store: &dyn MetadataStore) {
        let _ = store.update_video_cache_status(&job.video_id, CacheStatus::Failed, 0).await;
    }
}
