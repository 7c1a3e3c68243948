//! Job message schemas (spec.md §6). Field names match the spec verbatim
//! (snake_case) since these are the wire format published onto the bus,
//! not a client-facing API.

use serde::{Deserialize, Serialize};

use crate::domain::ErrorStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    H265,
    H264,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub video_id: String,
    pub video_code: String,
    pub input_path: String,
    pub output_path: String,
    pub codec: Codec,
    pub qualities: Vec<String>,
    pub use_byte_range: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    High = 1,
    Normal = 2,
    Low = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmCacheJob {
    pub video_id: String,
    pub video_code: String,
    pub hls_path: String,
    pub segment_counts: std::collections::HashMap<String, u32>,
    pub priority: Priority,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleDetectJob {
    pub video_id: String,
    pub video_code: String,
    pub audio_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleTranscribeJob {
    pub subtitle_id: String,
    pub video_id: String,
    pub video_code: String,
    pub audio_path: String,
    pub language: String,
    pub output_path: String,
    pub refine_with_llm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleTranslateJob {
    pub subtitle_ids: Vec<String>,
    pub video_id: String,
    pub video_code: String,
    pub source_srt_path: String,
    pub source_language: String,
    pub target_languages: Vec<String>,
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReelSegmentSelection {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReelExportJob {
    pub reel_id: String,
    pub video_id: String,
    pub video_code: String,
    pub hls_path: String,
    pub video_quality: String,
    pub segments: Vec<ReelSegmentSelection>,
    /// Legacy single-segment fallback fields (spec.md §6).
    pub segment_start: Option<f64>,
    pub segment_end: Option<f64>,
    pub cover_time: Option<f64>,
    pub style: String,
    pub title: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub show_logo: bool,
    pub logo_path: Option<String>,
    pub gradient_path: Option<String>,
    pub crop_x: Option<f64>,
    pub crop_y: Option<f64>,
    pub tts_text: Option<String>,
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryJob {
    pub video_id: String,
    pub video_code: String,
    pub hls_path: String,
    pub image_count: u32,
    pub classify_nsfw: bool,
    pub min_safe_images: u32,
    pub max_extra_frames: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqRecord {
    pub original_job: serde_json::Value,
    pub error: String,
    pub attempts: u32,
    pub worker_id: String,
    pub failed_at: i64,
    pub stage: ErrorStage,
}

/// Tagged union over every job shape the bus carries, used where a single
/// consumer needs to decode without knowing the pipeline ahead of time
/// (e.g. the DLQ subscriber re-serializing `original_job`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobMessage {
    Transcode(TranscodeJob),
    WarmCache(WarmCacheJob),
    SubtitleDetect(SubtitleDetectJob),
    SubtitleTranscribe(SubtitleTranscribeJob),
    SubtitleTranslate(SubtitleTranslateJob),
    ReelExport(ReelExportJob),
    Gallery(GalleryJob),
}
