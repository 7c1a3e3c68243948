//! Progress events (ephemeral pub/sub, spec.md §6) and the WebSocket
//! client-facing event shape they get translated into by the Progress
//! Broadcaster (spec.md §4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Processing,
    Completed,
    Failed,
}

/// Which pipeline produced a [`ProgressEvent`]. Carried on the wire so the
/// Progress Broadcaster can dispatch on the worker's own classification
/// instead of guessing from which optional fields happen to be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPipeline {
    Transcode,
    Subtitle,
    Gallery,
    Reel,
    WarmCache,
}

/// The event published by a worker on `progress.{video_id}` or
/// `progress.subtitle.{video_id}` (spec.md §6). All fields beyond the
/// identity + status + progress triplet are optional because each
/// pipeline only populates the ones relevant to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub video_id: String,
    pub video_code: String,
    pub pipeline: EventPipeline,
    pub status: ProgressStatus,
    pub stage: Option<String>,
    pub progress: u8,
    pub quality: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub output_path: Option<String>,
    pub audio_path: Option<String>,
    pub worker_id: Option<String>,
    pub subtitle_id: Option<String>,
    pub current_language: Option<String>,
    pub reel_id: Option<String>,
    pub file_size: Option<u64>,
}

impl ProgressEvent {
    pub fn is_gallery(&self) -> bool {
        self.pipeline == EventPipeline::Gallery
    }

    pub fn is_subtitle(&self) -> bool {
        self.pipeline == EventPipeline::Subtitle
    }

    pub fn subject(&self) -> String {
        if self.is_subtitle() {
            format!("progress.subtitle.{}", self.video_id)
        } else {
            format!("progress.{}", self.video_id)
        }
    }
}

/// Client-facing status after the broadcaster's mapping rule (spec.md
/// §4.6 step 3): `processing` at 0% progress presents as `started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Started,
    Processing,
    Completed,
    Failed,
}

impl ClientStatus {
    pub fn from_progress(status: ProgressStatus, progress: u8) -> Self {
        match status {
            ProgressStatus::Processing if progress == 0 => ClientStatus::Started,
            ProgressStatus::Processing => ClientStatus::Processing,
            ProgressStatus::Completed => ClientStatus::Completed,
            ProgressStatus::Failed => ClientStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Transcode,
    Subtitle,
    Gallery,
    Reel,
    WarmCache,
    Upload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientEventType {
    VideoProgress,
    SubtitleProgress,
    #[serde(rename = "transcode:completed")]
    TranscodeCompleted,
    #[serde(rename = "transcode:failed")]
    TranscodeFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEventData {
    pub video_id: String,
    pub video_code: String,
    pub video_title: String,
    #[serde(rename = "type")]
    pub kind: PipelineKind,
    pub status: ClientStatus,
    pub progress: u8,
    pub current_step: String,
    pub message: Option<String>,
    pub error_message: Option<String>,
    pub quality: Option<String>,
    pub output_path: Option<String>,
    pub subtitle_id: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEvent {
    #[serde(rename = "type")]
    pub kind: ClientEventType,
    pub data: ClientEventData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_at_zero_presents_as_started() {
        assert_eq!(
            ClientStatus::from_progress(ProgressStatus::Processing, 0),
            ClientStatus::Started
        );
        assert_eq!(
            ClientStatus::from_progress(ProgressStatus::Processing, 40),
            ClientStatus::Processing
        );
    }

    #[test]
    fn terminal_statuses_pass_through() {
        assert_eq!(
            ClientStatus::from_progress(ProgressStatus::Completed, 100),
            ClientStatus::Completed
        );
        assert_eq!(
            ClientStatus::from_progress(ProgressStatus::Failed, 10),
            ClientStatus::Failed
        );
    }

    #[test]
    fn gallery_and_subtitle_flavor_detection() {
        let mut e = ProgressEvent {
            video_id: "v1".into(),
            video_code: "abc".into(),
            pipeline: EventPipeline::Gallery,
            status: ProgressStatus::Processing,
            stage: None,
            progress: 10,
            quality: Some("gallery".into()),
            message: None,
            error: None,
            output_path: None,
            audio_path: None,
            worker_id: None,
            subtitle_id: None,
            current_language: None,
            reel_id: None,
            file_size: None,
        };
        assert!(e.is_gallery());
        assert!(!e.is_subtitle());

        e.pipeline = EventPipeline::Subtitle;
        e.quality = None;
        e.subtitle_id = Some("s1".into());
        assert!(e.is_subtitle());
        assert_eq!(e.subject(), "progress.subtitle.v1");
    }

    #[test]
    fn client_event_type_serializes_with_colon() {
        let json = serde_json::to_string(&ClientEventType::TranscodeCompleted).unwrap();
        assert_eq!(json, "\"transcode:completed\"");
    }
}
