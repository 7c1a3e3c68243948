//! Stream, subject, and KV bucket names for the job bus. Centralized so
//! the NATS-backed implementation and the in-memory test fake agree on
//! exactly the same wire names.

pub const TRANSCODE_JOBS: &str = "TRANSCODE_JOBS";
pub const SUBTITLE_JOBS: &str = "SUBTITLE_JOBS";
pub const WARM_CACHE_JOBS: &str = "WARM_CACHE_JOBS";
pub const REEL_JOBS: &str = "REEL_JOBS";
pub const GALLERY_JOBS: &str = "GALLERY_JOBS";
pub const JOBS_DLQ: &str = "JOBS_DLQ";

pub const WORKER_STATUS_BUCKET: &str = "WORKER_STATUS";

/// One of the durable work-queue streams a job can be published to.
/// `SUBTITLE_JOBS` multiplexes detect/transcribe/translate subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    Transcode,
    SubtitleDetect,
    SubtitleTranscribe,
    SubtitleTranslate,
    WarmCache,
    Reel,
    Gallery,
}

impl Pipeline {
    pub fn stream_name(self) -> &'static str {
        match self {
            Pipeline::Transcode => TRANSCODE_JOBS,
            Pipeline::SubtitleDetect | Pipeline::SubtitleTranscribe | Pipeline::SubtitleTranslate => SUBTITLE_JOBS,
            Pipeline::WarmCache => WARM_CACHE_JOBS,
            Pipeline::Reel => REEL_JOBS,
            Pipeline::Gallery => GALLERY_JOBS,
        }
    }

    /// The subject a job of this pipeline is published under within its
    /// stream. `SUBTITLE_JOBS` uses one subject per stage so a consumer
    /// can filter to the stage it executes.
    pub fn subject(self) -> &'static str {
        match self {
            Pipeline::Transcode => "jobs.transcode",
            Pipeline::SubtitleDetect => "jobs.subtitle.detect",
            Pipeline::SubtitleTranscribe => "jobs.subtitle.transcribe",
            Pipeline::SubtitleTranslate => "jobs.subtitle.translate",
            Pipeline::WarmCache => "jobs.warm_cache",
            Pipeline::Reel => "jobs.reel",
            Pipeline::Gallery => "jobs.gallery",
        }
    }

    /// The [`backplane_core::events::EventPipeline`] tag a job of this
    /// pipeline's worker should stamp on its progress events.
    pub fn as_event_pipeline(self) -> backplane_core::events::EventPipeline {
        use backplane_core::events::EventPipeline;
        match self {
            Pipeline::Transcode => EventPipeline::Transcode,
            Pipeline::SubtitleDetect | Pipeline::SubtitleTranscribe | Pipeline::SubtitleTranslate => EventPipeline::Subtitle,
            Pipeline::WarmCache => EventPipeline::WarmCache,
            Pipeline::Reel => EventPipeline::Reel,
            Pipeline::Gallery => EventPipeline::Gallery,
        }
    }
}

pub fn progress_subject(video_id: &str) -> String {
    format!("progress.{video_id}")
}

pub fn subtitle_progress_subject(video_id: &str) -> String {
    format!("progress.subtitle.{video_id}")
}
