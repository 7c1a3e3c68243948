use std::sync::Arc;

use async_trait::async_trait;
use backplane_bus::Pipeline;
use backplane_core::domain::worker_status::WorkerKind;
use backplane_core::domain::{ErrorStage, SubtitleStatus};
use backplane_core::events::{EventPipeline, ProgressEvent, ProgressStatus};
use backplane_core::messages::SubtitleTranscribeJob;
use backplane_store::MetadataStore;
use chrono::{DateTime, Utc};

use crate::ports::Transcriber;
use crate::runtime::{ProgressSender, StageExecutor};

pub struct SubtitleTranscribeExecutor {
    pub transcriber: Arc<dyn Transcriber>,
    pub max_retries: u32,
}

#[async_trait]
impl StageExecutor for SubtitleTranscribeExecutor {
    type Job = SubtitleTranscribeJob;

    fn pipeline(&self) -> Pipeline {
        Pipeline::SubtitleTranscribe
    }

    fn error_stage(&self) -> ErrorStage {
        ErrorStage::Transcode
    }

    fn worker_kind(&self) -> WorkerKind {
        WorkerKind::Subtitle
    }

    fn max_retries(&self, _job: &Self::Job) -> u32 {
        self.max_retries
    }

    fn entity_code(&self, job: &Self::Job) -> String {
        job.subtitle_id.clone()
    }

    fn video_id(&self, job: &Self::Job) -> String {
        job.video_id.clone()
    }

    fn video_code(&self, job: &Self::Job) -> String {
        job.video_code.clone()
    }

    async fn begin(&self, job: &Self::Job, store: &dyn MetadataStore, now: DateTime<Utc>) {
        let _ = store.begin_subtitle_stage(&job.subtitle_id, SubtitleStatus::Processing, now).await;
    }

    async fn run(&self, job: &Self::Job, _progress: &ProgressSender) -> anyhow::Result<ProgressEvent> {
        let output = self.transcriber.transcribe(&job.audio_path, &job.language).await?;

        Ok(ProgressEvent {
            video_id: job.video_id.clone(),
            video_code: job.video_code.clone(),
            pipeline: EventPipeline::Subtitle,
            status: ProgressStatus::Completed,
            stage: Some("transcribe".to_string()),
            progress: 100,
            quality: None,
            message: None,
            error: None,
            output_path: Some(job.output_path.clone()),
            audio_path: None,
            worker_id: None,
            subtitle_id: Some(job.subtitle_id.clone()),
            current_language: Some(job.language.clone()),
            reel_id: None,
            file_size: None,
        })
    }

    async fn on_success(&self, job: &Self::Job, outcome: &ProgressEvent, store: &dyn MetadataStore) {
        // The progress wire event has no confidence slot (spec.md §6); it
        // is not surfaced to clients, so there is nothing to carry here.
        let path = outcome.output_path.clone().unwrap_or_else(|| job.output_path.clone());
        let _ = store.complete_subtitle(&job.subtitle_id, path, None).await;
    }

    async fn on_retry(&self, job: &Self::Job, error: &str, _worker_id: &str, _attempt: u32, store: &dyn MetadataStore) {
        let _ = store.fail_subtitle(&job.subtitle_id, error.to_string()).await;
    }

    async fn on_exhausted(&self, job: &Self::Job, error: &str, _worker_id: &str, _attempt: u32, store: &dyn MetadataStore) {
        let _ = store.fail_subtitle(&job.subtitle_id, error.to_string()).await;
    }
}
