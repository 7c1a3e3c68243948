//! WorkerStatus: ephemeral heartbeat record stored in the `WORKER_STATUS`
//! KV bucket (spec.md §3, §4.3). Absence means the worker is offline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Transcode,
    Subtitle,
    WarmCache,
    Reel,
    Gallery,
    Seo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Processing,
    Stopping,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskLevel {
    Normal,
    Warning,
    Caution,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentJob {
    pub entity_id: String,
    pub entity_code: String,
    pub title: String,
    pub stage: String,
    pub progress: u8,
    pub eta_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskTelemetry {
    pub used_percent: f32,
    pub level: DiskLevel,
    pub paused: bool,
}

impl DiskTelemetry {
    pub fn classify(used_percent: f32) -> DiskLevel {
        if used_percent >= 95.0 {
            DiskLevel::Critical
        } else if used_percent >= 90.0 {
            DiskLevel::Caution
        } else if used_percent >= 80.0 {
            DiskLevel::Warning
        } else {
            DiskLevel::Normal
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifetimeCounters {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentJob {
    pub entity_code: String,
    pub stage: String,
    pub succeeded: bool,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub kind: WorkerKind,
    pub started_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub state: WorkerState,
    pub current_jobs: Vec<CurrentJob>,
    pub lifetime: LifetimeCounters,
    /// Bounded ring buffer of recently finished jobs.
    pub recent_jobs: Vec<RecentJob>,
    pub recent_jobs_capacity: usize,
    pub disk: DiskTelemetry,
}

impl WorkerStatus {
    pub fn new(worker_id: impl Into<String>, kind: WorkerKind, now: DateTime<Utc>) -> Self {
        Self {
            worker_id: worker_id.into(),
            kind,
            started_at: now,
            last_seen: now,
            state: WorkerState::Idle,
            current_jobs: Vec::new(),
            lifetime: LifetimeCounters {
                jobs_completed: 0,
                jobs_failed: 0,
            },
            recent_jobs: Vec::new(),
            recent_jobs_capacity: 50,
            disk: DiskTelemetry {
                used_percent: 0.0,
                level: DiskLevel::Normal,
                paused: false,
            },
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen = now;
    }

    pub fn push_recent(&mut self, job: RecentJob) {
        self.recent_jobs.push(job);
        if self.recent_jobs.len() > self.recent_jobs_capacity {
            self.recent_jobs.remove(0);
        }
    }

    /// Update disk telemetry and flip to `paused` at the `critical` level
    /// (spec.md §5, "at the critical level the worker pauses claiming new
    /// jobs until utilization drops below a watermark").
    pub fn update_disk(&mut self, used_percent: f32, resume_watermark: f32) {
        let level = DiskTelemetry::classify(used_percent);
        let was_paused = self.disk.paused;
        let paused = if level == DiskLevel::Critical {
            true
        } else if was_paused && used_percent > resume_watermark {
            true
        } else {
            false
        };
        self.disk = DiskTelemetry {
            used_percent,
            level,
            paused,
        };
        if paused && self.state != WorkerState::Stopping {
            self.state = WorkerState::Paused;
        } else if !paused && self.state == WorkerState::Paused {
            self.state = WorkerState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_level_thresholds() {
        assert_eq!(DiskTelemetry::classify(50.0), DiskLevel::Normal);
        assert_eq!(DiskTelemetry::classify(85.0), DiskLevel::Warning);
        assert_eq!(DiskTelemetry::classify(92.0), DiskLevel::Caution);
        assert_eq!(DiskTelemetry::classify(99.0), DiskLevel::Critical);
    }

    #[test]
    fn worker_pauses_at_critical_and_resumes_below_watermark() {
        let mut status = WorkerStatus::new("w1", WorkerKind::Transcode, Utc::now());
        status.update_disk(96.0, 70.0);
        assert!(status.disk.paused);
        assert_eq!(status.state, WorkerState::Paused);

        status.update_disk(80.0, 70.0);
        assert!(status.disk.paused, "still above resume watermark");

        status.update_disk(65.0, 70.0);
        assert!(!status.disk.paused);
        assert_eq!(status.state, WorkerState::Idle);
    }

    #[test]
    fn recent_jobs_ring_buffer_is_bounded() {
        let mut status = WorkerStatus::new("w1", WorkerKind::Gallery, Utc::now());
        status.recent_jobs_capacity = 2;
        for i in 0..5 {
            status.push_recent(RecentJob {
                entity_code: format!("v{i}"),
                stage: "gallery".into(),
                succeeded: true,
                finished_at: Utc::now(),
            });
        }
        assert_eq!(status.recent_jobs.len(), 2);
        assert_eq!(status.recent_jobs[1].entity_code, "v4");
    }
}
