//! Reel entity: a short derived clip (spec.md §3 "Reel").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReelStatus {
    Draft,
    Exporting,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReelStyle {
    Letterbox,
    Square,
    Fullcover,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextOverlay {
    pub line1: Option<String>,
    pub line2: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reel {
    pub id: String,
    pub owner_id: String,
    pub video_id: String,
    pub status: ReelStatus,
    /// Preferred multi-segment selection, ordered.
    pub segments: Vec<Segment>,
    /// Legacy single-segment fields, kept per spec.md §9 ("duplicate
    /// legacy fields... writers should emit both during a migration
    /// window"). Readers must prefer `segments` and fall back to these.
    pub legacy_segment_start: Option<f64>,
    pub legacy_segment_end: Option<f64>,
    pub style: ReelStyle,
    pub overlays: TextOverlay,
    pub tts_script: Option<String>,
    pub show_logo: bool,
    pub output_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub file_size_bytes: Option<u64>,
    pub exported_at: Option<DateTime<Utc>>,
    pub export_error: Option<String>,
}

impl Reel {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            video_id: video_id.into(),
            status: ReelStatus::Draft,
            segments: Vec::new(),
            legacy_segment_start: None,
            legacy_segment_end: None,
            style: ReelStyle::Letterbox,
            overlays: TextOverlay::default(),
            tts_script: None,
            show_logo: false,
            output_path: None,
            thumbnail_path: None,
            file_size_bytes: None,
            exported_at: None,
            export_error: None,
        }
    }

    /// Resolve the effective segment list, preferring the new
    /// multi-segment shape and falling back to the legacy single segment
    /// (spec.md §9).
    pub fn effective_segments(&self) -> Vec<Segment> {
        if !self.segments.is_empty() {
            return self.segments.clone();
        }
        match (self.legacy_segment_start, self.legacy_segment_end) {
            (Some(start), Some(end)) => vec![Segment { start, end }],
            _ => Vec::new(),
        }
    }

    /// Validate segments are non-empty, each of positive length, and
    /// within `[0, video_duration]` (spec.md §3 invariant).
    pub fn validate_segments(&self, video_duration_secs: f64) -> std::result::Result<(), String> {
        let segs = self.effective_segments();
        if segs.is_empty() {
            return Err("reel has no segments".into());
        }
        for seg in &segs {
            if seg.is_empty() {
                return Err(format!("segment {seg:?} has non-positive length"));
            }
            if seg.start < 0.0 || seg.end > video_duration_secs {
                return Err(format!(
                    "segment {seg:?} out of bounds [0, {video_duration_secs}]"
                ));
            }
        }
        Ok(())
    }

    pub fn begin_export(&mut self) -> Result<()> {
        match self.status {
            ReelStatus::Draft | ReelStatus::Failed => {
                self.status = ReelStatus::Exporting;
                self.export_error = None;
                Ok(())
            }
            other => Err(CoreError::InvalidTransition {
                entity: "reel",
                from: format!("{other:?}"),
                event: "begin_export".into(),
            }),
        }
    }

    pub fn complete(&mut self, output_path: String, thumbnail_path: String, file_size_bytes: u64, now: DateTime<Utc>) {
        if self.status == ReelStatus::Ready {
            return;
        }
        self.output_path = Some(output_path);
        self.thumbnail_path = Some(thumbnail_path);
        self.file_size_bytes = Some(file_size_bytes);
        self.exported_at = Some(now);
        self.status = ReelStatus::Ready;
    }

    pub fn fail(&mut self, message: String) {
        if self.status == ReelStatus::Ready {
            return;
        }
        self.export_error = Some(message);
        self.status = ReelStatus::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_segments_prefers_new_shape() {
        let mut r = Reel::new("r1", "owner1", "v1");
        r.legacy_segment_start = Some(0.0);
        r.legacy_segment_end = Some(5.0);
        r.segments = vec![Segment { start: 10.0, end: 15.0 }];
        assert_eq!(r.effective_segments(), vec![Segment { start: 10.0, end: 15.0 }]);
    }

    #[test]
    fn effective_segments_falls_back_to_legacy() {
        let mut r = Reel::new("r1", "owner1", "v1");
        r.legacy_segment_start = Some(1.0);
        r.legacy_segment_end = Some(4.0);
        assert_eq!(r.effective_segments(), vec![Segment { start: 1.0, end: 4.0 }]);
    }

    #[test]
    fn validate_segments_rejects_out_of_bounds() {
        let mut r = Reel::new("r1", "owner1", "v1");
        r.segments = vec![Segment { start: 0.0, end: 100.0 }];
        assert!(r.validate_segments(60.0).is_err());
    }

    #[test]
    fn validate_segments_rejects_empty_list() {
        let r = Reel::new("r1", "owner1", "v1");
        assert!(r.validate_segments(60.0).is_err());
    }
}
