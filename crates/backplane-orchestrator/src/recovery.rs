//! Stuck-Job Recovery (C8, spec.md §4.8): a periodic sweep for entities
//! that have sat in a transient state past their grace deadline. A video
//! is requeued without charging a retry, unless its retry count has
//! already reached the cap, in which case it is demoted to `failed`
//! instead of being requeued forever.

use std::sync::Arc;
use std::time::Duration;

use backplane_core::config::RecoveryConfig;
use backplane_core::domain::{SubtitleStatus, VideoStatus};
use backplane_store::MetadataStore;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct StuckJobRecovery {
    store: Arc<dyn MetadataStore>,
    config: RecoveryConfig,
    video_max_retries: u32,
}

impl StuckJobRecovery {
    pub fn new(store: Arc<dyn MetadataStore>, config: RecoveryConfig, video_max_retries: u32) -> Self {
        Self { store, config, video_max_retries }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs));
        while !cancel.is_cancelled() {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    /// One sweep pass, directly callable from tests without a ticker.
    pub async fn run_once(&self) {
        let now = Utc::now();

        for video in self.store.list_videos_by_status(VideoStatus::Processing).await {
            let Some(started_at) = video.processing_started_at else { continue };
            let stuck_for = now.signed_duration_since(started_at).num_seconds().max(0) as u64;
            if stuck_for > self.config.video_grace_secs {
                if video.retry_count >= self.video_max_retries {
                    info!(video_id = %video.id, stuck_for, "retry cap exhausted, demoting stuck video to failed");
                    let _ = self.store.demote_stuck_video(&video.id).await;
                } else {
                    info!(video_id = %video.id, stuck_for, "requeuing stuck video");
                    let _ = self.store.requeue_stuck_video(&video.id).await;
                }
            }
        }

        for status in [SubtitleStatus::Detecting, SubtitleStatus::Processing, SubtitleStatus::Translating] {
            for subtitle in self.store.list_subtitles_by_status(status).await {
                let Some(started_at) = subtitle.processing_started_at else { continue };
                let stuck_for = now.signed_duration_since(started_at).num_seconds().max(0) as u64;
                if stuck_for > self.config.subtitle_grace_secs {
                    info!(subtitle_id = %subtitle.id, stuck_for, "requeuing stuck subtitle");
                    let _ = self.store.requeue_stuck_subtitle(&subtitle.id).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use backplane_core::domain::Video;
    use backplane_store::InMemoryStore;
    use chrono::Duration as ChronoDuration;

    use super::*;

    #[tokio::test]
    async fn stuck_video_past_grace_is_requeued() {
        let store = InMemoryStore::new();
        let mut video = Video::new("v1", "abc", "owner1");
        video.status = VideoStatus::Processing;
        video.processing_started_at = Some(Utc::now() - ChronoDuration::seconds(1000));
        store.put_video(video).await;

        let recovery = StuckJobRecovery::new(
            store.clone(),
            RecoveryConfig {
                video_grace_secs: 900,
                subtitle_grace_secs: 900,
                sweep_interval_secs: 60,
            },
            3,
        );
        recovery.run_once().await;

        let video = store.get_video("v1").await.unwrap();
        assert_eq!(video.status, VideoStatus::Queued);
    }

    #[tokio::test]
    async fn recently_started_video_is_left_alone() {
        let store = InMemoryStore::new();
        let mut video = Video::new("v1", "abc", "owner1");
        video.status = VideoStatus::Processing;
        video.processing_started_at = Some(Utc::now());
        store.put_video(video).await;

        let recovery = StuckJobRecovery::new(store.clone(), RecoveryConfig::default(), 3);
        recovery.run_once().await;

        let video = store.get_video("v1").await.unwrap();
        assert_eq!(video.status, VideoStatus::Processing);
    }

    #[tokio::test]
    async fn stuck_video_past_retry_cap_is_demoted_to_failed() {
        let store = InMemoryStore::new();
        let mut video = Video::new("v1", "abc", "owner1");
        video.status = VideoStatus::Processing;
        video.retry_count = 3;
        video.processing_started_at = Some(Utc::now() - ChronoDuration::seconds(1000));
        store.put_video(video).await;

        let recovery = StuckJobRecovery::new(
            store.clone(),
            RecoveryConfig {
                video_grace_secs: 900,
                subtitle_grace_secs: 900,
                sweep_interval_secs: 60,
            },
            3,
        );
        recovery.run_once().await;

        let video = store.get_video("v1").await.unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
        assert_eq!(video.retry_count, 3);
    }
}
