use std::sync::Arc;

use async_trait::async_trait;
use backplane_bus::Pipeline;
use backplane_core::domain::worker_status::WorkerKind;
use backplane_core::domain::ErrorStage;
use backplane_core::events::{EventPipeline, ProgressEvent, ProgressStatus};
use backplane_core::messages::SubtitleDetectJob;
use backplane_store::MetadataStore;
use chrono::{DateTime, Utc};

use crate::ports::LanguageDetector;
use crate::runtime::{ProgressSender, StageExecutor};

/// `detect` writes the detected language back onto the *video*, not a
/// subtitle row (spec.md §4.5 "Subtitle"); there is no per-row
/// begin/complete here because the video itself is the entity whose
/// state this stage reports through (it stays `processing` throughout,
/// already entered by the upstream transcode stage).
pub struct SubtitleDetectExecutor {
    pub detector: Arc<dyn LanguageDetector>,
    pub max_retries: u32,
}

#[async_trait]
impl StageExecutor for SubtitleDetectExecutor {
    type Job = SubtitleDetectJob;

    fn pipeline(&self) -> Pipeline {
        Pipeline::SubtitleDetect
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
        job.video_code.clone()
    }

    fn video_id(&self, job: &Self::Job) -> String {
        job.video_id.clone()
    }

    fn video_code(&self, job: &Self::Job) -> String {
        job.video_code.clone()
    }

    async fn begin(&self, _job: &Self::Job, _store: &dyn MetadataStore, _now: DateTime<Utc>) {
        // No-op: the video is already `processing`/`ready` from the
        // transcode stage; detect does not own a transition of its own.
    }

    async fn run(&self, job: &Self::Job, _progress: &ProgressSender) -> anyhow::Result<ProgressEvent> {
        let language = self.detector.detect(&job.audio_path).await?;

        Ok(ProgressEvent {
            video_id: job.video_id.clone(),
            video_code: job.video_code.clone(),
            pipeline: EventPipeline::Subtitle,
            status: ProgressStatus::Completed,
            stage: Some("detect".to_string()),
            progress: 100,
            quality: None,
            message: None,
            error: None,
            output_path: None,
            audio_path: None,
            worker_id: None,
            subtitle_id: None,
            current_language: Some(language),
            reel_id: None,
            file_size: None,
        })
    }

    async fn on_success(&self, job: &Self::Job, outcome: &ProgressEvent, store: &dyn MetadataStore) {
        if let Some(language) = &outcome.current_language {
            let _ = store.set_video_detected_language(&job.video_id, language.clone()).await;
        }
    }

    async fn on_retry(&self, _job: &Self::Job, _error: &str, _worker_id: &str, _attempt: u32, _store: &dyn MetadataStore) {
        // Detect has no subtitle row of its own to mark failed; the bus
        // redelivery is the only retry mechanism.
    }

    async fn on_exhausted(&self, _job: &Self::Job, _error: &str, _worker_id: &str, _attempt: u32, _store: &dyn MetadataStore) {}
}
