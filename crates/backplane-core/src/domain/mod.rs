//! Entity types and their state machines (spec.md §3, §4 "State machines
//! (summary)"). Each module owns a pure `transition`-shaped API so the
//! invariants in spec.md §8 are testable without a database.

pub mod ad_impression;
pub mod reel;
pub mod subtitle;
pub mod system_setting;
pub mod video;
pub mod whitelist;
pub mod worker_status;

pub use ad_impression::{AdImpression, DeviceClass};
pub use reel::{Reel, ReelStatus, ReelStyle, Segment, TextOverlay};
pub use subtitle::{Subtitle, SubtitleStatus, SubtitleType};
pub use system_setting::{SettingAuditLog, SystemSetting};
pub use video::{CacheStatus, ErrorHistoryEntry, ErrorStage, GalleryStatus, GalleryTierCounts, Video, VideoStatus};
pub use whitelist::{normalize_domain, pattern_matches, AdType, PreRollAd, WatermarkPosition, WatermarkSettings, WhitelistProfile};
pub use worker_status::{CurrentJob, DiskLevel, DiskTelemetry, LifetimeCounters, RecentJob, WorkerKind, WorkerState, WorkerStatus};
