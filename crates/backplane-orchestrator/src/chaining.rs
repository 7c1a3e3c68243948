//! Pipeline Orchestrator (C7) auto-chaining rules (spec.md §4.7): the one
//! hard-wired chain (transcode → subtitle detect) plus the two
//! configurable ones resolved in DESIGN.md (warm-cache/gallery on ready).

use backplane_bus::Publisher;
use backplane_core::config::OrchestratorConfig;
use backplane_core::domain::Video;
use backplane_core::messages::{GalleryJob, Priority, SubtitleDetectJob, WarmCacheJob};

pub struct PipelineOrchestrator {
    publisher: Publisher,
    config: OrchestratorConfig,
}

impl PipelineOrchestrator {
    pub fn new(publisher: Publisher, config: OrchestratorConfig) -> Self {
        Self { publisher, config }
    }

    /// Called once a transcode job reaches `completed` with a non-empty
    /// audio artifact (spec.md §4.7, "on transcode completed, writing
    /// detected language is user-initiated" implies the chain stops at
    /// detect, not transcribe).
    pub async fn on_transcode_completed(&self, video: &Video) {
        if !self.config.auto_chain_subtitle_detect {
            return;
        }
        let Some(audio_path) = &video.audio_path else { return };
        if audio_path.is_empty() {
            return;
        }
        let job = SubtitleDetectJob {
            video_id: video.id.clone(),
            video_code: video.code.clone(),
            audio_path: audio_path.clone(),
        };
        let _ = self.publisher.publish_subtitle_detect(&job).await;
    }

    /// Called once a video reaches `ready`; both legs are operator-
    /// configurable, defaulting to off (spec.md §9 open question).
    pub async fn on_video_ready(&self, video: &Video) {
        let Some(hls_path) = &video.master_hls_path else { return };

        if self.config.auto_enqueue_warm_cache_on_ready {
            let job = WarmCacheJob {
                video_id: video.id.clone(),
                video_code: video.code.clone(),
                hls_path: hls_path.clone(),
                segment_counts: Default::default(),
                priority: Priority::Normal,
                created_at: chrono::Utc::now().timestamp(),
            };
            let _ = self.publisher.publish_warm_cache(&job).await;
        }

        if self.config.auto_enqueue_gallery_on_ready {
            let job = GalleryJob {
                video_id: video.id.clone(),
                video_code: video.code.clone(),
                hls_path: hls_path.clone(),
                image_count: 20,
                classify_nsfw: true,
                min_safe_images: 8,
                max_extra_frames: 20,
            };
            let _ = self.publisher.publish_gallery(&job).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use backplane_bus::testing::InMemoryJobBus;
    use backplane_bus::{JobBus, Pipeline};
    use backplane_store::InMemoryStore;

    use super::*;

    fn video_with_audio(id: &str) -> Video {
        let mut video = Video::new(id, "code1", "owner1");
        video.audio_path = Some("hls/code1/audio.wav".to_string());
        video.master_hls_path = Some("hls/code1/master.m3u8".to_string());
        video
    }

    #[tokio::test]
    async fn transcode_completed_chains_subtitle_detect_by_default() {
        let bus: Arc<dyn JobBus> = Arc::new(InMemoryJobBus::new());
        let orchestrator = PipelineOrchestrator::new(Publisher::new(bus.clone(), InMemoryStore::new()), OrchestratorConfig::default());

        orchestrator.on_transcode_completed(&video_with_audio("v1")).await;

        let delivered = bus.fetch(Pipeline::SubtitleDetect, 1, Duration::from_millis(1)).await.unwrap();
        assert_eq!(delivered.len(), 1);
    }

    #[tokio::test]
    async fn ready_chaining_is_off_by_default() {
        let bus: Arc<dyn JobBus> = Arc::new(InMemoryJobBus::new());
        let orchestrator = PipelineOrchestrator::new(Publisher::new(bus.clone(), InMemoryStore::new()), OrchestratorConfig::default());

        orchestrator.on_video_ready(&video_with_audio("v1")).await;

        let warm = bus.fetch(Pipeline::WarmCache, 1, Duration::from_millis(1)).await.unwrap();
        let gallery = bus.fetch(Pipeline::Gallery, 1, Duration::from_millis(1)).await.unwrap();
        assert!(warm.is_empty());
        assert!(gallery.is_empty());
    }
}
