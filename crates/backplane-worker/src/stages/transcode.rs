use std::sync::Arc;

use async_trait::async_trait;
use backplane_bus::Pipeline;
use backplane_core::domain::worker_status::WorkerKind;
use backplane_core::domain::{ErrorHistoryEntry, ErrorStage};
use backplane_core::events::{EventPipeline, ProgressEvent, ProgressStatus};
use backplane_core::messages::TranscodeJob;
use backplane_store::MetadataStore;
use chrono::{DateTime, Utc};

use crate::ports::Transcoder;
use crate::runtime::{ProgressSender, StageExecutor};

pub struct TranscodeExecutor {
    pub transcoder: Arc<dyn Transcoder>,
    pub max_retries: u32,
}

#[async_trait]
impl StageExecutor for TranscodeExecutor {
    type Job = TranscodeJob;

    fn pipeline(&self) -> Pipeline {
        Pipeline::Transcode
    }

    fn error_stage(&self) -> ErrorStage {
        ErrorStage::Transcode
    }

    fn worker_kind(&self) -> WorkerKind {
        WorkerKind::Transcode
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

    async fn begin(&self, job: &Self::Job, store: &dyn MetadataStore, now: DateTime<Utc>) {
        let _ = store.begin_video_processing(&job.video_id, now).await;
    }

    async fn run(&self, job: &Self::Job, progress: &ProgressSender) -> anyhow::Result<ProgressEvent> {
        let output = self
            .transcoder
            .transcode(&job.input_path, &job.output_path, &job.qualities, progress, &job.video_id, &job.video_code)
            .await?;

        Ok(ProgressEvent {
            video_id: job.video_id.clone(),
            video_code: job.video_code.clone(),
            pipeline: EventPipeline::Transcode,
            status: ProgressStatus::Completed,
            stage: None,
            progress: 100,
            quality: None,
            message: None,
            error: None,
            output_path: Some(output.master_hls_path),
            audio_path: Some(output.audio_path),
            worker_id: None,
            subtitle_id: None,
            current_language: None,
            reel_id: None,
            file_size: None,
        })
    }

    async fn on_success(&self, job: &Self::Job, outcome: &ProgressEvent, store: &dyn MetadataStore) {
        let hls_path = outcome.output_path.clone().unwrap_or_default();
        let audio_path = outcome.audio_path.clone();
        let _ = store.complete_video(&job.video_id, hls_path, audio_path).await;
    }

    async fn on_retry(&self, job: &Self::Job, error: &str, worker_id: &str, attempt: u32, store: &dyn MetadataStore) {
        let entry = ErrorHistoryEntry {
            attempt,
            stage: ErrorStage::Transcode,
            worker_id: worker_id.to_string(),
            timestamp: Utc::now(),
            message: error.to_string(),
        };
        let _ = store.fail_video(&job.video_id, entry, self.max_retries).await;
    }

    async fn on_exhausted(&self, job: &Self::Job, error: &str, worker_id: &str, attempt: u32, store: &dyn MetadataStore) {
        let entry = ErrorHistoryEntry {
            attempt,
            stage: ErrorStage::Transcode,
            worker_id: worker_id.to_string(),
            timestamp: Utc::now(),
            message: error.to_string(),
        };
        let _ = store.fail_video(&job.video_id, entry, self.max_retries).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use backplane_bus::testing::InMemoryJobBus;
    use backplane_bus::JobBus;
    use backplane_core::domain::{Video, VideoStatus};
    use backplane_core::messages::Codec;
    use backplane_store::InMemoryStore;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::ports::reference::ReferenceTranscoder;
    use crate::runtime::{ConsumerRuntime, RuntimeConfig};

    fn job() -> TranscodeJob {
        TranscodeJob {
            video_id: "v1".into(),
            video_code: "abc".into(),
            input_path: "videos/abc/original.mp4".into(),
            output_path: "hls/abc/".into(),
            codec: Codec::H265,
            qualities: vec!["1080p".into(), "720p".into()],
            use_byte_range: false,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn happy_path_transitions_video_to_ready() {
        let bus: Arc<dyn JobBus> = Arc::new(InMemoryJobBus::new());
        let store = InMemoryStore::new();
        store.put_video(Video::new("v1", "abc", "owner1")).await;

        bus.publish_job(Pipeline::Transcode, serde_json::to_vec(&job()).unwrap()).await.unwrap();

        let executor = TranscodeExecutor {
            transcoder: Arc::new(ReferenceTranscoder),
            max_retries: 3,
        };
        let runtime = ConsumerRuntime::new(bus.clone(), store.clone(), "w1", executor, RuntimeConfig::default());

        let cancel = CancellationToken::new();
        let run_handle = tokio::spawn({
            let runtime_cancel = cancel.clone();
            async move { runtime.run(runtime_cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let _ = run_handle.await;

        let video = store.get_video("v1").await.unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.master_hls_path.as_deref(), Some("hls/abc/master.m3u8"));
        assert_eq!(video.audio_path.as_deref(), Some("hls/abc/audio.wav"));
    }

    struct AlwaysFailsTranscoder;

    #[async_trait::async_trait]
    impl Transcoder for AlwaysFailsTranscoder {
        async fn transcode(&self, _input_path: &str, _output_path: &str, _qualities: &[String], _progress: &ProgressSender, _video_id: &str, _video_code: &str) -> anyhow::Result<crate::ports::TranscodeOutput> {
            anyhow::bail!("ffmpeg exit 1")
        }
    }

    #[tokio::test]
    async fn exhausted_retries_route_to_dlq_exactly_once() {
        let bus: Arc<dyn JobBus> = Arc::new(InMemoryJobBus::new());
        let store = InMemoryStore::new();
        store.put_video(Video::new("v2", "def", "owner1")).await;

        bus.publish_job(Pipeline::Transcode, serde_json::to_vec(&TranscodeJob { video_id: "v2".into(), video_code: "def".into(), ..job() }).unwrap()).await.unwrap();

        let executor = TranscodeExecutor {
            transcoder: Arc::new(AlwaysFailsTranscoder),
            max_retries: 3,
        };
        let config = RuntimeConfig {
            retry_backoff: Duration::from_millis(1),
            fetch_wait: Duration::from_millis(20),
            ..RuntimeConfig::default()
        };
        let runtime = ConsumerRuntime::new(bus.clone(), store.clone(), "w2", executor, config);

        let cancel = CancellationToken::new();
        let run_handle = tokio::spawn({
            let runtime_cancel = cancel.clone();
            async move { runtime.run(runtime_cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        let _ = run_handle.await;

        let video = store.get_video("v2").await.unwrap();
        assert_eq!(video.status, VideoStatus::DeadLetter);

        let dlq_records = bus.fetch_dlq(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(dlq_records.len(), 1, "job exhausting retries should land in the DLQ exactly once");
        let record: backplane_core::messages::DlqRecord = serde_json::from_slice(&dlq_records[0].payload).unwrap();
        assert_eq!(record.attempts, 3);
        assert_eq!(record.error, "ffmpeg exit 1");
    }
}
