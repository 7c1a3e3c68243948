//! The Publisher (C4): one method per job shape, validating required
//! fields — and, for `subtitle_translate`, the cross-entity precondition
//! that the source-language original is `ready` — before the bus call so
//! a malformed or premature job never reaches a worker. Queue
//! introspection delegates straight to the bus.

use std::sync::Arc;

use backplane_core::domain::{SubtitleStatus, SubtitleType};
use backplane_core::messages::{
    GalleryJob, ReelExportJob, SubtitleDetectJob, SubtitleTranscribeJob, SubtitleTranslateJob, TranscodeJob, WarmCacheJob,
};
use backplane_store::MetadataStore;

use crate::bus::{JobBus, PublishAck, QueueInfo};
use crate::error::{PublishError, PublishResult};
use crate::streams::Pipeline;

pub struct Publisher {
    bus: Arc<dyn JobBus>,
    store: Arc<dyn MetadataStore>,
}

fn require_non_empty(field: &'static str, value: &str) -> PublishResult<()> {
    if value.trim().is_empty() {
        return Err(PublishError::MissingField(field));
    }
    Ok(())
}

impl Publisher {
    pub fn new(bus: Arc<dyn JobBus>, store: Arc<dyn MetadataStore>) -> Self {
        Self { bus, store }
    }

    pub async fn publish_transcode(&self, job: &TranscodeJob) -> PublishResult<PublishAck> {
        require_non_empty("video_id", &job.video_id)?;
        require_non_empty("video_code", &job.video_code)?;
        require_non_empty("input_path", &job.input_path)?;
        let payload = serde_json::to_vec(job).map_err(crate::error::BusError::from)?;
        Ok(self.bus.publish_job(Pipeline::Transcode, payload).await?)
    }

    pub async fn publish_warm_cache(&self, job: &WarmCacheJob) -> PublishResult<PublishAck> {
        require_non_empty("video_id", &job.video_id)?;
        require_non_empty("hls_path", &job.hls_path)?;
        let payload = serde_json::to_vec(job).map_err(crate::error::BusError::from)?;
        Ok(self.bus.publish_job(Pipeline::WarmCache, payload).await?)
    }

    pub async fn publish_subtitle_detect(&self, job: &SubtitleDetectJob) -> PublishResult<PublishAck> {
        require_non_empty("video_id", &job.video_id)?;
        require_non_empty("audio_path", &job.audio_path)?;
        let payload = serde_json::to_vec(job).map_err(crate::error::BusError::from)?;
        Ok(self.bus.publish_job(Pipeline::SubtitleDetect, payload).await?)
    }

    pub async fn publish_subtitle_transcribe(&self, job: &SubtitleTranscribeJob) -> PublishResult<PublishAck> {
        require_non_empty("subtitle_id", &job.subtitle_id)?;
        require_non_empty("audio_path", &job.audio_path)?;
        let payload = serde_json::to_vec(job).map_err(crate::error::BusError::from)?;
        Ok(self.bus.publish_job(Pipeline::SubtitleTranscribe, payload).await?)
    }

    pub async fn publish_subtitle_translate(&self, job: &SubtitleTranslateJob) -> PublishResult<PublishAck> {
        if job.subtitle_ids.is_empty() {
            return Err(PublishError::MissingField("subtitle_ids"));
        }
        require_non_empty("source_srt_path", &job.source_srt_path)?;
        require_non_empty("source_language", &job.source_language)?;

        let has_ready_original = self
            .store
            .list_subtitles_for_video(&job.video_id)
            .await
            .into_iter()
            .any(|s| s.kind == SubtitleType::Original && s.language == job.source_language && s.status == SubtitleStatus::Ready);
        if !has_ready_original {
            return Err(PublishError::PreconditionFailed(format!(
                "video {} has no ready original subtitle in language {}",
                job.video_id, job.source_language
            )));
        }

        let payload = serde_json::to_vec(job).map_err(crate::error::BusError::from)?;
        Ok(self.bus.publish_job(Pipeline::SubtitleTranslate, payload).await?)
    }

    pub async fn publish_reel_export(&self, job: &ReelExportJob) -> PublishResult<PublishAck> {
        require_non_empty("reel_id", &job.reel_id)?;
        require_non_empty("video_id", &job.video_id)?;
        require_non_empty("hls_path", &job.hls_path)?;
        let payload = serde_json::to_vec(job).map_err(crate::error::BusError::from)?;
        Ok(self.bus.publish_job(Pipeline::Reel, payload).await?)
    }

    pub async fn publish_gallery(&self, job: &GalleryJob) -> PublishResult<PublishAck> {
        require_non_empty("video_id", &job.video_id)?;
        require_non_empty("hls_path", &job.hls_path)?;
        let payload = serde_json::to_vec(job).map_err(crate::error::BusError::from)?;
        Ok(self.bus.publish_job(Pipeline::Gallery, payload).await?)
    }

    pub async fn queue_info(&self, pipeline: Pipeline) -> PublishResult<QueueInfo> {
        Ok(self.bus.queue_info(pipeline).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use backplane_core::messages::Codec;
    use backplane_store::InMemoryStore;

    use super::*;
    use crate::testing::InMemoryJobBus;

    fn sample_transcode(video_id: &str) -> TranscodeJob {
        TranscodeJob {
            video_id: video_id.to_string(),
            video_code: "abc".to_string(),
            input_path: "videos/abc/original.mp4".to_string(),
            output_path: "hls/abc/".to_string(),
            codec: Codec::H265,
            qualities: vec!["1080p".to_string(), "720p".to_string()],
            use_byte_range: false,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn publish_transcode_rejects_empty_video_id() {
        let bus = Arc::new(InMemoryJobBus::new());
        let publisher = Publisher::new(bus, InMemoryStore::new());
        let job = sample_transcode("");
        let err = publisher.publish_transcode(&job).await.unwrap_err();
        assert!(matches!(err, PublishError::MissingField("video_id")));
    }

    #[tokio::test]
    async fn valid_transcode_job_reaches_the_stream() {
        let bus = Arc::new(InMemoryJobBus::new());
        let publisher = Publisher::new(bus.clone() as Arc<dyn JobBus>, InMemoryStore::new());
        publisher.publish_transcode(&sample_transcode("v1")).await.unwrap();
        let delivered = bus.fetch(Pipeline::Transcode, 1, Duration::from_millis(1)).await.unwrap();
        assert_eq!(delivered.len(), 1);
    }

    #[tokio::test]
    async fn queue_info_reports_pending_and_completed() {
        let bus = Arc::new(InMemoryJobBus::new());
        let publisher = Publisher::new(bus.clone() as Arc<dyn JobBus>, InMemoryStore::new());
        publisher.publish_transcode(&sample_transcode("v1")).await.unwrap();
        publisher.publish_transcode(&sample_transcode("v2")).await.unwrap();
        let _ = bus.fetch(Pipeline::Transcode, 1, Duration::from_millis(1)).await.unwrap();
        let info = publisher.queue_info(Pipeline::Transcode).await.unwrap();
        assert_eq!(info.pending, 1);
        assert_eq!(info.completed, 1);
    }

    fn sample_translate(video_id: &str) -> SubtitleTranslateJob {
        SubtitleTranslateJob {
            subtitle_ids: vec!["s-fr".to_string()],
            video_id: video_id.to_string(),
            video_code: "abc".to_string(),
            source_srt_path: "subtitles/abc/en.srt".to_string(),
            source_language: "en".to_string(),
            target_languages: vec!["fr".to_string()],
            output_path: "subtitles/abc/".to_string(),
        }
    }

    #[tokio::test]
    async fn publish_subtitle_translate_rejects_missing_ready_original() {
        let bus = Arc::new(InMemoryJobBus::new());
        let publisher = Publisher::new(bus, InMemoryStore::new());
        let err = publisher.publish_subtitle_translate(&sample_translate("v1")).await.unwrap_err();
        assert!(matches!(err, PublishError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn publish_subtitle_translate_accepts_when_original_is_ready() {
        use backplane_core::domain::Subtitle;

        let bus = Arc::new(InMemoryJobBus::new());
        let store = InMemoryStore::new();
        let mut original = Subtitle::new_original("s-en", "v1", "en");
        original.complete("subtitles/abc/en.srt".into(), Some(0.9)).unwrap();
        store.put_subtitle(original).await;
        let publisher = Publisher::new(bus.clone() as Arc<dyn JobBus>, store);

        publisher.publish_subtitle_translate(&sample_translate("v1")).await.unwrap();
        let delivered = bus.fetch(Pipeline::SubtitleTranslate, 1, Duration::from_millis(1)).await.unwrap();
        assert_eq!(delivered.len(), 1);
    }
}
