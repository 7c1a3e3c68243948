//! Abstract ports behind which the FFmpeg invocation and ML model
//! internals live, entirely out of scope here (spec.md §1). The stage
//! executors depend only on these traits; the workspace ships a
//! `reference` implementation of each that fabricates deterministic
//! output, enough to exercise the runtime's state-machine and retry/DLQ
//! behavior in tests without a real media pipeline.

use async_trait::async_trait;

use crate::runtime::ProgressSender;

#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    pub master_hls_path: String,
    pub h264_fallback_hls_path: Option<String>,
    pub audio_path: String,
    pub quality_size_bytes: std::collections::HashMap<String, u64>,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        input_path: &str,
        output_path: &str,
        qualities: &[String],
        progress: &ProgressSender,
        video_id: &str,
        video_code: &str,
    ) -> anyhow::Result<TranscodeOutput>;
}

#[async_trait]
pub trait LanguageDetector: Send + Sync {
    async fn detect(&self, audio_path: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct TranscribeOutput {
    pub srt_text: String,
    pub confidence: f32,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &str, language: &str) -> anyhow::Result<TranscribeOutput>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, source_srt: &str, source_language: &str, target_language: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy)]
pub struct ClassificationResult {
    pub nsfw_score: f32,
    pub has_face: bool,
}

#[async_trait]
pub trait NsfwClassifier: Send + Sync {
    /// Classification errors are treated as `nsfw` by the caller
    /// (spec.md §4.5 "Safety-first rule"), not by this port.
    async fn classify(&self, frame: &[u8]) -> anyhow::Result<ClassificationResult>;
}

#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    pub bytes: Vec<u8>,
    pub offset_secs: f64,
}

#[async_trait]
pub trait GalleryExtractor: Send + Sync {
    /// Extract frames from `hls_path` for one round (spec.md §4.5
    /// "re-extract from alternate rounds"), skipping the configured
    /// head/tail fraction of the runtime.
    async fn extract_round(&self, hls_path: &str, round: GalleryRound, count: u32, duration_secs: f64) -> anyhow::Result<Vec<ExtractedFrame>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryRound {
    Even,
    IntroFocus,
    OutroFocus,
    GapFill,
    DenseIntro,
}

#[derive(Debug, Clone)]
pub struct ReelOutput {
    pub output_path: String,
    pub thumbnail_path: String,
    pub file_size_bytes: u64,
}

#[async_trait]
pub trait ReelCompositor: Send + Sync {
    async fn compose(&self, job: &backplane_core::messages::ReelExportJob, progress: &ProgressSender) -> anyhow::Result<ReelOutput>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarmCacheOutput {
    pub percent_warmed: u8,
}

#[async_trait]
pub trait CdnWarmer: Send + Sync {
    async fn warm(&self, hls_path: &str, segment_counts: &std::collections::HashMap<String, u32>, progress: &ProgressSender, video_id: &str, video_code: &str) -> anyhow::Result<WarmCacheOutput>;
}

/// Deterministic reference implementations of every port, used by the
/// workspace's own tests. Nothing here is meant to run against real
/// media; it stands in for the out-of-scope ML/FFmpeg layer.
pub mod reference {
    use super::*;

    pub struct ReferenceTranscoder;

    #[async_trait]
    impl Transcoder for ReferenceTranscoder {
        async fn transcode(
            &self,
            _input_path: &str,
            output_path: &str,
            qualities: &[String],
            progress: &ProgressSender,
            video_id: &str,
            video_code: &str,
        ) -> anyhow::Result<TranscodeOutput> {
            let mut sizes = std::collections::HashMap::new();
            for (i, quality) in qualities.iter().enumerate() {
                let pct = (((i + 1) * 100) / qualities.len().max(1)) as u8;
                progress
                    .send(&backplane_core::events::ProgressEvent {
                        video_id: video_id.to_string(),
                        video_code: video_code.to_string(),
                        pipeline: backplane_core::events::EventPipeline::Transcode,
                        status: backplane_core::events::ProgressStatus::Processing,
                        stage: None,
                        progress: pct,
                        quality: Some(quality.clone()),
                        message: None,
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
                sizes.insert(quality.clone(), 1_000_000);
            }
            Ok(TranscodeOutput {
                master_hls_path: backplane_core::paths::hls_master(video_code),
                h264_fallback_hls_path: None,
                audio_path: backplane_core::paths::hls_audio(video_code),
                quality_size_bytes: sizes,
            })
        }
    }

    pub struct ReferenceLanguageDetector;

    #[async_trait]
    impl LanguageDetector for ReferenceLanguageDetector {
        async fn detect(&self, _audio_path: &str) -> anyhow::Result<String> {
            Ok("en".to_string())
        }
    }

    pub struct ReferenceTranscriber;

    #[async_trait]
    impl Transcriber for ReferenceTranscriber {
        async fn transcribe(&self, _audio_path: &str, _language: &str) -> anyhow::Result<TranscribeOutput> {
            Ok(TranscribeOutput {
                srt_text: "1\n00:00:00,000 --> 00:00:01,000\n(reference transcript)\n".to_string(),
                confidence: 0.9,
            })
        }
    }

    pub struct ReferenceTranslator;

    #[async_trait]
    impl Translator for ReferenceTranslator {
        async fn translate(&self, source_srt: &str, _source_language: &str, _target_language: &str) -> anyhow::Result<String> {
            Ok(source_srt.to_string())
        }
    }

    pub struct ReferenceNsfwClassifier;

    #[async_trait]
    impl NsfwClassifier for ReferenceNsfwClassifier {
        async fn classify(&self, _frame: &[u8]) -> anyhow::Result<ClassificationResult> {
            Ok(ClassificationResult {
                nsfw_score: 0.05,
                has_face: true,
            })
        }
    }

    pub struct ReferenceGalleryExtractor;

    #[async_trait]
    impl GalleryExtractor for ReferenceGalleryExtractor {
        async fn extract_round(&self, _hls_path: &str, _round: GalleryRound, count: u32, duration_secs: f64) -> anyhow::Result<Vec<ExtractedFrame>> {
            let head = duration_secs * 0.05;
            let tail = duration_secs * 0.95;
            let span = (tail - head).max(0.0);
            Ok((0..count)
                .map(|i| ExtractedFrame {
                    bytes: vec![0u8; 16],
                    offset_secs: head + span * (i as f64 / count.max(1) as f64),
                })
                .collect())
        }
    }

    pub struct ReferenceReelCompositor;

    #[async_trait]
    impl ReelCompositor for ReferenceReelCompositor {
        async fn compose(&self, job: &backplane_core::messages::ReelExportJob, _progress: &ProgressSender) -> anyhow::Result<ReelOutput> {
            Ok(ReelOutput {
                output_path: backplane_core::paths::reel_output(&job.reel_id),
                thumbnail_path: backplane_core::paths::reel_thumb(&job.reel_id),
                file_size_bytes: 2_000_000,
            })
        }
    }

    pub struct ReferenceCdnWarmer;

    #[async_trait]
    impl CdnWarmer for ReferenceCdnWarmer {
        async fn warm(&self, _hls_path: &str, _segment_counts: &std::collections::HashMap<String, u32>, _progress: &ProgressSender, _video_id: &str, _video_code: &str) -> anyhow::Result<WarmCacheOutput> {
            Ok(WarmCacheOutput { percent_warmed: 100 })
        }
    }
}
