//! Subtitle entity: one row per (video, language) (spec.md §3 "Subtitle").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleType {
    Original,
    Translated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleStatus {
    Pending,
    Queued,
    Detecting,
    Detected,
    Processing,
    Ready,
    Translating,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtitle {
    pub id: String,
    pub video_id: String,
    pub language: String,
    pub kind: SubtitleType,
    pub source_language: Option<String>,
    pub artifact_path: Option<String>,
    pub confidence: Option<f32>,
    pub status: SubtitleStatus,
    pub error: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
}

impl Subtitle {
    pub fn new_original(id: impl Into<String>, video_id: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            video_id: video_id.into(),
            language: language.into(),
            kind: SubtitleType::Original,
            source_language: None,
            artifact_path: None,
            confidence: None,
            status: SubtitleStatus::Pending,
            error: None,
            processing_started_at: None,
        }
    }

    pub fn new_translated(
        id: impl Into<String>,
        video_id: impl Into<String>,
        language: impl Into<String>,
        source_language: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            video_id: video_id.into(),
            language: language.into(),
            kind: SubtitleType::Translated,
            source_language: Some(source_language.into()),
            artifact_path: None,
            confidence: None,
            status: SubtitleStatus::Pending,
            error: None,
            processing_started_at: None,
        }
    }

    /// "Job started" callback (spec.md §4.5, Subtitle pipeline): flips
    /// `queued -> processing`-family status with a fresh
    /// `processing_started_at`, distinct from the generic video
    /// transition because subtitles fan out into three sub-stages.
    pub fn begin_stage(&mut self, target: SubtitleStatus, now: DateTime<Utc>) -> Result<()> {
        let valid_target = matches!(
            target,
            SubtitleStatus::Detecting | SubtitleStatus::Processing | SubtitleStatus::Translating
        );
        if !valid_target {
            return Err(CoreError::InvalidTransition {
                entity: "subtitle",
                from: format!("{:?}", self.status),
                event: format!("begin_stage({target:?})"),
            });
        }
        match self.status {
            SubtitleStatus::Pending | SubtitleStatus::Queued | SubtitleStatus::Detected => {
                self.status = target;
                self.processing_started_at = Some(now);
                Ok(())
            }
            SubtitleStatus::Ready | SubtitleStatus::Failed => Ok(()), // terminal no-op
            other => Err(CoreError::InvalidTransition {
                entity: "subtitle",
                from: format!("{other:?}"),
                event: format!("begin_stage({target:?})"),
            }),
        }
    }

    /// `detect` stage success: writes nothing on the subtitle row itself
    /// beyond marking it `detected` (the detected language is written
    /// onto the *video*, see `Video`); kept for symmetry so the runtime
    /// can report the detect sub-stage's own terminal state.
    pub fn mark_detected(&mut self) {
        if self.status != SubtitleStatus::Ready && self.status != SubtitleStatus::Failed {
            self.status = SubtitleStatus::Detected;
            self.processing_started_at = None;
        }
    }

    pub fn complete(&mut self, artifact_path: String, confidence: Option<f32>) -> Result<()> {
        match self.status {
            SubtitleStatus::Ready => Ok(()),
            SubtitleStatus::Failed => Err(CoreError::InvalidTransition {
                entity: "subtitle",
                from: "failed".into(),
                event: "complete".into(),
            }),
            _ => {
                self.artifact_path = Some(artifact_path);
                self.confidence = confidence;
                self.status = SubtitleStatus::Ready;
                self.processing_started_at = None;
                Ok(())
            }
        }
    }

    pub fn fail(&mut self, message: String) {
        if self.status == SubtitleStatus::Ready {
            return;
        }
        self.error = Some(message);
        self.status = SubtitleStatus::Failed;
        self.processing_started_at = None;
    }

    pub fn requeue_stuck(&mut self) {
        if matches!(
            self.status,
            SubtitleStatus::Queued
                | SubtitleStatus::Detecting
                | SubtitleStatus::Processing
                | SubtitleStatus::Translating
        ) {
            self.status = SubtitleStatus::Queued;
            self.processing_started_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translated_requires_ready_original_precondition_is_caller_enforced() {
        // The invariant "a translated row requires its source-language
        // original be ready" is enforced by the Publisher at job-acceptance
        // time, not here; this entity only records the relationship.
        let s = Subtitle::new_translated("s2", "v1", "fr", "en");
        assert_eq!(s.source_language.as_deref(), Some("en"));
        assert_eq!(s.kind, SubtitleType::Translated);
    }

    #[test]
    fn begin_stage_sets_processing_started_at() {
        let mut s = Subtitle::new_original("s1", "v1", "en");
        s.status = SubtitleStatus::Queued;
        s.begin_stage(SubtitleStatus::Processing, Utc::now()).unwrap();
        assert_eq!(s.status, SubtitleStatus::Processing);
        assert!(s.processing_started_at.is_some());
    }

    #[test]
    fn complete_then_fail_does_not_regress() {
        let mut s = Subtitle::new_original("s1", "v1", "en");
        s.status = SubtitleStatus::Processing;
        s.complete("subtitles/abc/en.srt".into(), Some(0.92)).unwrap();
        s.fail("late error".into());
        assert_eq!(s.status, SubtitleStatus::Ready);
    }
}
