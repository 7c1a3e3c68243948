//! AdImpression event record (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Mobile,
    Desktop,
    Tablet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdImpression {
    pub profile_id: Option<String>,
    pub video_code: String,
    pub domain: String,
    pub ad_url: String,
    pub ad_duration_secs: f64,
    pub watched_duration_secs: f64,
    pub completed: bool,
    pub skipped: bool,
    pub skip_at_secs: Option<f64>,
    pub error: bool,
    pub device_class: DeviceClass,
    pub user_agent: String,
    pub ip: String,
    pub created_at: DateTime<Utc>,
}
