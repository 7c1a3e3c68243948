//! Metadata Store port (component C2, spec.md §4 "every worker action
//! that affects status is expressed as a conditional update"). Every
//! mutating method is one named conditional transition (not a generic
//! read-modify-write closure) so the trait stays object-safe and callers
//! can hold it as `Arc<dyn MetadataStore>`. `InMemoryStore` backs the
//! workspace's tests, guarded the way the teacher guards `AppState`
//! (`dashmap::DashMap`, no lock spanning an `.await`).

use std::sync::Arc;

use async_trait::async_trait;
use backplane_core::domain::{
    AdImpression, ErrorHistoryEntry, Reel, SettingAuditLog, Subtitle, SubtitleStatus, SystemSetting, Video,
    VideoStatus, WhitelistProfile,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] backplane_core::CoreError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_video(&self, id: &str) -> Option<Video>;
    async fn get_video_by_code(&self, code: &str) -> Option<Video>;
    async fn put_video(&self, video: Video);
    async fn list_videos_by_status(&self, status: VideoStatus) -> Vec<Video>;

    /// Conditional `pending`/`queued` -> `processing` transition (spec.md
    /// §4.5 step 2). Returns `true` if the transition was applied.
    async fn begin_video_processing(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;
    /// Refresh-only path for a `processing` event seen while already
    /// `processing` (spec.md §4.6 step 6 / §9 resolved open question).
    async fn refresh_video_processing_started_at(&self, id: &str, now: DateTime<Utc>) -> Result<()>;
    /// Conditional completion; a no-op if already `ready` so a late or
    /// duplicate completion cannot regress anything (spec.md §8).
    async fn complete_video(&self, id: &str, hls_path: String, audio_path: Option<String>) -> Result<()>;
    /// Append to error history, bump retry count, and move to
    /// `dead_letter` once the cap is reached (spec.md §4.7).
    async fn fail_video(&self, id: &str, entry: ErrorHistoryEntry, max_retries: u32) -> Result<VideoStatus>;
    async fn operator_reset_video(&self, id: &str) -> Result<()>;
    /// Stuck-recovery requeue: `processing` -> `queued`, retry count left
    /// intact (spec.md §4.8).
    async fn requeue_stuck_video(&self, id: &str) -> Result<()>;
    /// Stuck-recovery demotion: `processing` -> `failed`, used once the
    /// video's retry cap is already exhausted (spec.md §4.8).
    async fn demote_stuck_video(&self, id: &str) -> Result<()>;
    async fn update_video_cache_status(
        &self,
        id: &str,
        status: backplane_core::domain::CacheStatus,
        progress: u8,
    ) -> Result<()>;
    async fn update_video_gallery_status(
        &self,
        id: &str,
        status: backplane_core::domain::GalleryStatus,
    ) -> Result<()>;
    async fn set_video_detected_language(&self, id: &str, language: String) -> Result<()>;

    async fn get_subtitle(&self, id: &str) -> Option<Subtitle>;
    async fn list_subtitles_for_video(&self, video_id: &str) -> Vec<Subtitle>;
    async fn put_subtitle(&self, subtitle: Subtitle);
    async fn list_subtitles_by_status(&self, status: SubtitleStatus) -> Vec<Subtitle>;
    async fn begin_subtitle_stage(&self, id: &str, target: SubtitleStatus, now: DateTime<Utc>) -> Result<()>;
    async fn mark_subtitle_detected(&self, id: &str) -> Result<()>;
    async fn complete_subtitle(&self, id: &str, artifact_path: String, confidence: Option<f32>) -> Result<()>;
    async fn fail_subtitle(&self, id: &str, message: String) -> Result<()>;
    async fn requeue_stuck_subtitle(&self, id: &str) -> Result<()>;

    async fn get_reel(&self, id: &str) -> Option<Reel>;
    async fn put_reel(&self, reel: Reel);
    async fn begin_reel_export(&self, id: &str) -> Result<()>;
    async fn complete_reel(
        &self,
        id: &str,
        output_path: String,
        thumbnail_path: String,
        file_size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Result<()>;
    async fn fail_reel(&self, id: &str, message: String) -> Result<()>;

    async fn list_active_whitelist_profiles(&self) -> Vec<WhitelistProfile>;
    async fn put_whitelist_profile(&self, profile: WhitelistProfile);

    async fn record_ad_impression(&self, impression: AdImpression);

    async fn get_setting(&self, key: &str) -> Option<SystemSetting>;
    async fn put_setting(&self, setting: SystemSetting);
    async fn append_setting_audit(&self, entry: SettingAuditLog);
}

/// In-process reference implementation.
#[derive(Default)]
pub struct InMemoryStore {
    videos: DashMap<String, Video>,
    videos_by_code: DashMap<String, String>,
    subtitles: DashMap<String, Subtitle>,
    reels: DashMap<String, Reel>,
    whitelist_profiles: DashMap<String, WhitelistProfile>,
    ad_impressions: DashMap<u64, AdImpression>,
    ad_impression_seq: std::sync::atomic::AtomicU64,
    settings: DashMap<String, SystemSetting>,
    setting_audit: DashMap<u64, SettingAuditLog>,
    setting_audit_seq: std::sync::atomic::AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn video_mut(&self, id: &str) -> Result<dashmap::mapref::one::RefMut<'_, String, Video>> {
        self.videos
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn subtitle_mut(&self, id: &str) -> Result<dashmap::mapref::one::RefMut<'_, String, Subtitle>> {
        self.subtitles
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn reel_mut(&self, id: &str) -> Result<dashmap::mapref::one::RefMut<'_, String, Reel>> {
        self.reels
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn get_video(&self, id: &str) -> Option<Video> {
        self.videos.get(id).map(|v| v.clone())
    }

    async fn get_video_by_code(&self, code: &str) -> Option<Video> {
        let id = self.videos_by_code.get(code)?.clone();
        self.videos.get(&id).map(|v| v.clone())
    }

    async fn put_video(&self, video: Video) {
        self.videos_by_code.insert(video.code.clone(), video.id.clone());
        self.videos.insert(video.id.clone(), video);
    }

    async fn list_videos_by_status(&self, status: VideoStatus) -> Vec<Video> {
        self.videos.iter().filter(|v| v.status == status).map(|v| v.clone()).collect()
    }

    async fn begin_video_processing(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut video = self.video_mut(id)?;
        match video.status {
            VideoStatus::Pending | VideoStatus::Queued => {
                video.begin_processing(now)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn refresh_video_processing_started_at(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut video = self.video_mut(id)?;
        video.refresh_processing_started_at(now);
        Ok(())
    }

    async fn complete_video(&self, id: &str, hls_path: String, audio_path: Option<String>) -> Result<()> {
        let mut video = self.video_mut(id)?;
        video.complete(hls_path, audio_path)?;
        Ok(())
    }

    async fn fail_video(&self, id: &str, entry: ErrorHistoryEntry, max_retries: u32) -> Result<VideoStatus> {
        let mut video = self.video_mut(id)?;
        video.fail(entry, max_retries);
        Ok(video.status)
    }

    async fn operator_reset_video(&self, id: &str) -> Result<()> {
        let mut video = self.video_mut(id)?;
        video.operator_reset()?;
        Ok(())
    }

    async fn requeue_stuck_video(&self, id: &str) -> Result<()> {
        let mut video = self.video_mut(id)?;
        video.requeue_stuck();
        Ok(())
    }

    async fn demote_stuck_video(&self, id: &str) -> Result<()> {
        let mut video = self.video_mut(id)?;
        video.demote_stuck();
        Ok(())
    }

    async fn update_video_cache_status(
        &self,
        id: &str,
        status: backplane_core::domain::CacheStatus,
        progress: u8,
    ) -> Result<()> {
        let mut video = self.video_mut(id)?;
        video.cache_status = status;
        video.cache_progress = progress;
        Ok(())
    }

    async fn update_video_gallery_status(
        &self,
        id: &str,
        status: backplane_core::domain::GalleryStatus,
    ) -> Result<()> {
        let mut video = self.video_mut(id)?;
        video.gallery_status = status;
        Ok(())
    }

    async fn set_video_detected_language(&self, id: &str, language: String) -> Result<()> {
        let mut video = self.video_mut(id)?;
        video.detected_language = Some(language);
        Ok(())
    }

    async fn get_subtitle(&self, id: &str) -> Option<Subtitle> {
        self.subtitles.get(id).map(|s| s.clone())
    }

    async fn list_subtitles_for_video(&self, video_id: &str) -> Vec<Subtitle> {
        self.subtitles.iter().filter(|s| s.video_id == video_id).map(|s| s.clone()).collect()
    }

    async fn put_subtitle(&self, subtitle: Subtitle) {
        self.subtitles.insert(subtitle.id.clone(), subtitle);
    }

    async fn list_subtitles_by_status(&self, status: SubtitleStatus) -> Vec<Subtitle> {
        self.subtitles.iter().filter(|s| s.status == status).map(|s| s.clone()).collect()
    }

    async fn begin_subtitle_stage(&self, id: &str, target: SubtitleStatus, now: DateTime<Utc>) -> Result<()> {
        let mut subtitle = self.subtitle_mut(id)?;
        subtitle.begin_stage(target, now)?;
        Ok(())
    }

    async fn mark_subtitle_detected(&self, id: &str) -> Result<()> {
        let mut subtitle = self.subtitle_mut(id)?;
        subtitle.mark_detected();
        Ok(())
    }

    async fn complete_subtitle(&self, id: &str, artifact_path: String, confidence: Option<f32>) -> Result<()> {
        let mut subtitle = self.subtitle_mut(id)?;
        subtitle.complete(artifact_path, confidence)?;
        Ok(())
    }

    async fn fail_subtitle(&self, id: &str, message: String) -> Result<()> {
        let mut subtitle = self.subtitle_mut(id)?;
        subtitle.fail(message);
        Ok(())
    }

    async fn requeue_stuck_subtitle(&self, id: &str) -> Result<()> {
        let mut subtitle = self.subtitle_mut(id)?;
        subtitle.requeue_stuck();
        Ok(())
    }

    async fn get_reel(&self, id: &str) -> Option<Reel> {
        self.reels.get(id).map(|r| r.clone())
    }

    async fn put_reel(&self, reel: Reel) {
        self.reels.insert(reel.id.clone(), reel);
    }

    async fn begin_reel_export(&self, id: &str) -> Result<()> {
        let mut reel = self.reel_mut(id)?;
        reel.begin_export()?;
        Ok(())
    }

    async fn complete_reel(
        &self,
        id: &str,
        output_path: String,
        thumbnail_path: String,
        file_size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut reel = self.reel_mut(id)?;
        reel.complete(output_path, thumbnail_path, file_size_bytes, now);
        Ok(())
    }

    async fn fail_reel(&self, id: &str, message: String) -> Result<()> {
        let mut reel = self.reel_mut(id)?;
        reel.fail(message);
        Ok(())
    }

    async fn list_active_whitelist_profiles(&self) -> Vec<WhitelistProfile> {
        self.whitelist_profiles.iter().filter(|p| p.active).map(|p| p.clone()).collect()
    }

    async fn put_whitelist_profile(&self, profile: WhitelistProfile) {
        self.whitelist_profiles.insert(profile.id.clone(), profile);
    }

    async fn record_ad_impression(&self, impression: AdImpression) {
        let seq = self.ad_impression_seq.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.ad_impressions.insert(seq, impression);
    }

    async fn get_setting(&self, key: &str) -> Option<SystemSetting> {
        self.settings.get(key).map(|s| s.clone())
    }

    async fn put_setting(&self, setting: SystemSetting) {
        self.settings.insert(setting.key.clone(), setting);
    }

    async fn append_setting_audit(&self, entry: SettingAuditLog) {
        let seq = self.setting_audit_seq.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.setting_audit.insert(seq, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backplane_core::domain::{ErrorStage, Video};

    #[tokio::test]
    async fn begin_processing_only_applies_from_pending_or_queued() {
        let store = InMemoryStore::new();
        store.put_video(Video::new("v1", "abc", "owner1")).await;

        let applied = store.begin_video_processing("v1", Utc::now()).await.unwrap();
        assert!(applied);
        assert_eq!(store.get_video("v1").await.unwrap().status, VideoStatus::Processing);

        // A second call while already processing should not re-apply (it
        // is not pending/queued anymore).
        let applied_again = store.begin_video_processing("v1", Utc::now()).await.unwrap();
        assert!(!applied_again);
    }

    #[tokio::test]
    async fn complete_then_late_fail_does_not_regress() {
        let store = InMemoryStore::new();
        store.put_video(Video::new("v1", "abc", "owner1")).await;
        store.begin_video_processing("v1", Utc::now()).await.unwrap();
        store
            .complete_video("v1", "hls/abc/master.m3u8".into(), Some("hls/abc/audio.wav".into()))
            .await
            .unwrap();

        let status = store
            .fail_video(
                "v1",
                ErrorHistoryEntry {
                    attempt: 1,
                    stage: ErrorStage::Upload,
                    worker_id: "w1".into(),
                    timestamp: Utc::now(),
                    message: "late failure".into(),
                },
                3,
            )
            .await
            .unwrap();
        assert_eq!(status, VideoStatus::Ready);
    }

    #[tokio::test]
    async fn missing_video_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.begin_video_processing("missing", Utc::now()).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }
}
