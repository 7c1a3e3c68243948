pub mod gallery;
pub mod reel;
pub mod subtitle_detect;
pub mod subtitle_transcribe;
pub mod subtitle_translate;
pub mod transcode;
pub mod warm_cache;

pub use gallery::GalleryExecutor;
pub use reel::ReelExecutor;
pub use subtitle_detect::SubtitleDetectExecutor;
pub use subtitle_transcribe::SubtitleTranscribeExecutor;
pub use subtitle_translate::SubtitleTranslateExecutor;
pub use transcode::TranscodeExecutor;
pub use warm_cache::WarmCacheExecutor;
