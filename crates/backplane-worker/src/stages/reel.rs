use std::sync::Arc;

use async_trait::async_trait;
use backplane_bus::Pipeline;
use backplane_core::domain::worker_status::WorkerKind;
use backplane_core::domain::ErrorStage;
use backplane_core::events::{EventPipeline, ProgressEvent, ProgressStatus};
use backplane_core::messages::ReelExportJob;
use backplane_store::MetadataStore;
use chrono::{DateTime, Utc};

use crate::ports::ReelCompositor;
use crate::runtime::{ProgressSender, StageExecutor};

pub struct ReelExecutor {
    pub compositor: Arc<dyn ReelCompositor>,
    pub max_retries: u32,
}

#[async_trait]
impl StageExecutor for ReelExecutor {
    type Job = ReelExportJob;

    fn pipeline(&self) -> Pipeline {
        Pipeline::Reel
    }

    fn error_stage(&self) -> ErrorStage {
        ErrorStage::Transcode
    }

    fn worker_kind(&self) -> WorkerKind {
        WorkerKind::Reel
    }

    fn max_retries(&self, _job: &Self::Job) -> u32 {
        self.max_retries
    }

    fn entity_code(&self, job: &Self::Job) -> String {
        job.reel_id.clone()
    }

    fn video_id(&self, job: &Self::Job) -> String {
        job.video_id.clone()
    }

    fn video_code(&self, job: &Self::Job) -> String {
        job.video_code.clone()
    }

    async fn begin(&self, job: &Self::Job, store: &dyn MetadataStore, _now: DateTime<Utc>) {
        let _ = store.begin_reel_export(&job.reel_id).await;
    }

    async fn run(&self, job: &Self::Job, progress: &ProgressSender) -> anyhow::Result<ProgressEvent> {
        let output = self.compositor.compose(job, progress).await?;

        Ok(ProgressEvent {
            video_id: job.video_id.clone(),
            video_code: job.video_code.clone(),
            pipeline: EventPipeline::Reel,
            status: ProgressStatus::Completed,
            stage: None,
            progress: 100,
            quality: None,
            message: None,
            error: None,
            output_path: Some(output.output_path),
            audio_path: None,
            worker_id: None,
            subtitle_id: None,
            current_language: None,
            reel_id: Some(job.reel_id.clone()),
            file_size: Some(output.file_size_bytes),
        })
    }

    async fn on_success(&self, job: &Self::Job, outcome: &ProgressEvent, store: &dyn MetadataStore) {
        let output_path = outcome.output_path.clone().unwrap_or_default();
        // The composer's thumbnail path is derived deterministically from
        // the reel id (see `backplane_core::paths::reel_thumb`), so it is
        // safe to recompute here rather than round-trip it through the
        // progress event.
        let thumbnail_path = backplane_core::paths::reel_thumb(&job.reel_id);
        let file_size = outcome.file_size.unwrap_or(0);
        let _ = store.complete_reel(&job.reel_id, output_path, thumbnail_path, file_size, Utc::now()).await;
    }

    async fn on_retry(&self, job: &Self::Job, error: &str, _worker_id: &str, _attempt: u32, store: &dyn MetadataStore) {
        let _ = store.fail_reel(&job.reel_id, error.to_string()).await;
    }

    async fn on_exhausted(&self, job: &Self::Job, error: &str, _worker_id: &str, _attempt: u32, store: &dyn MetadataStore) {
        let _ = store.fail_reel(&job.reel_id, error.to_string()).await;
    }
}
