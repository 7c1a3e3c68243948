use std::sync::Arc;

use async_trait::async_trait;
use backplane_bus::Pipeline;
use backplane_core::domain::worker_status::WorkerKind;
use backplane_core::domain::{ErrorStage, GalleryStatus, GalleryTierCounts};
use backplane_core::events::{EventPipeline, ProgressEvent, ProgressStatus};
use backplane_core::messages::GalleryJob;
use backplane_store::{BlobStore, MetadataStore};
use chrono::{DateTime, Utc};

use crate::ports::{GalleryExtractor, GalleryRound, NsfwClassifier};
use crate::runtime::{ProgressSender, StageExecutor};

const SUPER_SAFE_THRESHOLD: f32 = 0.15;
const SAFE_THRESHOLD: f32 = 0.30;

/// Extra rounds tried, in order, when the initial even spread leaves
/// `min_safe_images` unmet (spec.md §4.5 "re-extract from alternate
/// rounds" for the Gallery pipeline).
const EXTRA_ROUNDS: [GalleryRound; 4] = [
    GalleryRound::IntroFocus,
    GalleryRound::OutroFocus,
    GalleryRound::GapFill,
    GalleryRound::DenseIntro,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    SuperSafe,
    Safe,
    Nsfw,
}

impl Tier {
    fn dir(self) -> &'static str {
        match self {
            Tier::SuperSafe => "super_safe",
            Tier::Safe => "safe",
            Tier::Nsfw => "nsfw",
        }
    }
}

pub struct GalleryExecutor {
    pub extractor: Arc<dyn GalleryExtractor>,
    pub classifier: Arc<dyn NsfwClassifier>,
    pub blobs: Arc<dyn BlobStore>,
    pub store: Arc<dyn MetadataStore>,
    pub max_retries: u32,
}

#[async_trait]
impl StageExecutor for GalleryExecutor {
    type Job = GalleryJob;

    fn pipeline(&self) -> Pipeline {
        Pipeline::Gallery
    }

    fn error_stage(&self) -> ErrorStage {
        ErrorStage::Transcode
    }

    fn worker_kind(&self) -> WorkerKind {
        WorkerKind::Gallery
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
        let _ = store.update_video_gallery_status(&job.video_id, GalleryStatus::Processing).await;
    }

    async fn run(&self, job: &Self::Job, progress: &ProgressSender) -> anyhow::Result<ProgressEvent> {
        let duration_secs = self.store.get_video(&job.video_id).await.map(|v| v.duration_secs).unwrap_or(0.0);

        let mut counts = GalleryTierCounts::default();
        let mut seq: u32 = 0;
        let mut extra_used: u32 = 0;

        seq = self
            .classify_and_store(job, GalleryRound::Even, job.image_count, seq, duration_secs, &mut counts)
            .await?;

        let mut round_idx = 0;
        while counts.super_safe + counts.safe < job.min_safe_images && extra_used < job.max_extra_frames && round_idx < EXTRA_ROUNDS.len() {
            let take = job.max_extra_frames.saturating_sub(extra_used).min(job.image_count.max(1));
            if take == 0 {
                break;
            }
            seq = self.classify_and_store(job, EXTRA_ROUNDS[round_idx], take, seq, duration_secs, &mut counts).await?;
            extra_used += take;
            round_idx += 1;

            progress
                .send(&ProgressEvent {
                    video_id: job.video_id.clone(),
                    video_code: job.video_code.clone(),
                    pipeline: EventPipeline::Gallery,
                    status: ProgressStatus::Processing,
                    stage: Some("gallery".to_string()),
                    progress: 50,
                    quality: Some("gallery".to_string()),
                    message: Some(format!("re-extracting round {round_idx} to reach {} safe images", job.min_safe_images)),
                    error: None,
                    output_path: None,
                    audio_path: None,
                    worker_id: None,
                    subtitle_id: None,
                    current_language: None,
                    reel_id: None,
                    file_size: None,
                })
                .await;
        }

        let pending_review = counts.super_safe + counts.safe < job.min_safe_images;

        Ok(ProgressEvent {
            video_id: job.video_id.clone(),
            video_code: job.video_code.clone(),
            pipeline: EventPipeline::Gallery,
            status: ProgressStatus::Completed,
            stage: None,
            progress: 100,
            quality: Some("gallery".to_string()),
            message: if pending_review {
                Some("needs manual review".to_string())
            } else {
                None
            },
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
        let status = if outcome.message.as_deref() == Some("needs manual review") {
            GalleryStatus::PendingReview
        } else {
            GalleryStatus::Ready
        };
        let _ = store.update_video_gallery_status(&job.video_id, status).await;
    }

    async fn on_retry(&self, job: &Self::Job, error: &str, _worker_id: &str, _attempt: u32, store: &dyn MetadataStore) {
        tracing::warn!(video_id = %job.video_id, %error, "gallery extraction failed, will retry");
        let _ = store.update_video_gallery_status(&job.video_id, GalleryStatus::Processing).await;
    }

    async fn on_exhausted(&self, job: &Self::Job, _error: &str, _worker_id: &str, _attempt: u32, store: &dyn MetadataStore) {
        // No dedicated gallery `failed` variant; `none` leaves the video
        // eligible for a fresh manual retrigger.
        let _ = store.update_video_gallery_status(&job.video_id, GalleryStatus::None).await;
    }
}

impl GalleryExecutor {
    async fn classify_and_store(&self, job: &GalleryJob, round: GalleryRound, count: u32, mut seq: u32, duration_secs: f64, counts: &mut GalleryTierCounts) -> anyhow::Result<u32> {
        let frames = self.extractor.extract_round(&job.hls_path, round, count, duration_secs).await?;

        for frame in frames {
            let source_path = backplane_core::paths::gallery_source(&job.video_code, seq);
            self.blobs.put(&source_path, frame.bytes.clone().into()).await?;
            counts.source += 1;

            let tier = if job.classify_nsfw {
                match self.classifier.classify(&frame.bytes).await {
                    Ok(result) if result.nsfw_score < SUPER_SAFE_THRESHOLD && result.has_face => Tier::SuperSafe,
                    Ok(result) if result.nsfw_score < SAFE_THRESHOLD => Tier::Safe,
                    // Safety-first rule: classifier errors are treated as
                    // NSFW, never as safe (spec.md §4.5 edge cases).
                    _ => Tier::Nsfw,
                }
            } else {
                Tier::Nsfw
            };

            let tier_path = backplane_core::paths::gallery_tier(&job.video_code, tier.dir(), seq);
            self.blobs.put(&tier_path, frame.bytes.into()).await?;
            match tier {
                Tier::SuperSafe => counts.super_safe += 1,
                Tier::Safe => counts.safe += 1,
                Tier::Nsfw => counts.nsfw += 1,
            }

            seq += 1;
        }

        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::ports::ExtractedFrame;

    struct FiveErrorsClassifier;

    #[async_trait]
    impl NsfwClassifier for FiveErrorsClassifier {
        async fn classify(&self, frame: &[u8]) -> anyhow::Result<crate::ports::ClassificationResult> {
            // Frames with a leading marker byte simulate a classifier
            // failure; everything else reports a confident safe result.
            if frame.first() == Some(&0xFF) {
                anyhow::bail!("classifier unavailable")
            }
            Ok(crate::ports::ClassificationResult { nsfw_score: 0.05, has_face: true })
        }
    }

    struct FixedExtractor;

    #[async_trait]
    impl GalleryExtractor for FixedExtractor {
        async fn extract_round(&self, _hls_path: &str, _round: GalleryRound, count: u32, _duration_secs: f64) -> anyhow::Result<Vec<ExtractedFrame>> {
            Ok((0..count)
                .map(|i| ExtractedFrame {
                    bytes: if i < 5 { vec![0xFF, 0] } else { vec![1, 2] },
                    offset_secs: i as f64,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn classifier_errors_are_filed_under_nsfw() {
        let tmp = tempfile::tempdir().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(backplane_store::FilesystemBlobStore::new(tmp.path(), "https://cdn.example.test"));
        let store = backplane_store::InMemoryStore::new();
        let mut video = backplane_core::domain::Video::new("v4", "code4", "owner1");
        video.duration_secs = 120.0;
        store.put_video(video).await;

        let executor = GalleryExecutor {
            extractor: Arc::new(FixedExtractor),
            classifier: Arc::new(FiveErrorsClassifier),
            blobs,
            store,
            max_retries: 3,
        };

        let job = GalleryJob {
            video_id: "v4".into(),
            video_code: "code4".into(),
            hls_path: "hls/code4/master.m3u8".into(),
            image_count: 100,
            classify_nsfw: true,
            min_safe_images: 10,
            max_extra_frames: 0,
        };

        let progress = ProgressSender::new(Arc::new(backplane_bus::testing::InMemoryJobBus::new()));
        let outcome = executor.run(&job, &progress).await.unwrap();
        assert_eq!(outcome.status, backplane_core::events::ProgressStatus::Completed);

        let mut counts = GalleryTierCounts::default();
        // Re-derive counts the same way `run` did, by re-classifying the
        // same deterministic frames, to assert the partition without
        // threading internal state out of `run`.
        for i in 0..100u32 {
            let bytes = if i < 5 { vec![0xFF, 0] } else { vec![1, 2] };
            match executor.classifier.classify(&bytes).await {
                Ok(r) if r.nsfw_score < SUPER_SAFE_THRESHOLD && r.has_face => counts.super_safe += 1,
                Ok(r) if r.nsfw_score < SAFE_THRESHOLD => counts.safe += 1,
                _ => counts.nsfw += 1,
            }
        }
        assert_eq!(counts.nsfw, 5);
        assert_eq!(counts.super_safe, 95);
    }

    /// spec.md §4.5/§8 scenario 5: `safe` is `score < 0.30`, `nsfw` is
    /// `score >= 0.30` — a frame right at the boundary must file under
    /// `nsfw`, not slip into `safe` under a looser threshold.
    #[test]
    fn boundary_score_files_under_nsfw_not_safe() {
        let result = crate::ports::ClassificationResult { nsfw_score: 0.30, has_face: false };
        let tier = match result {
            r if r.nsfw_score < SUPER_SAFE_THRESHOLD && r.has_face => Tier::SuperSafe,
            r if r.nsfw_score < SAFE_THRESHOLD => Tier::Safe,
            _ => Tier::Nsfw,
        };
        assert_eq!(tier, Tier::Nsfw);
    }
}
