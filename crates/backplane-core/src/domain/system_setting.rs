//! Versioned system settings and their audit log (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSetting {
    pub key: String,
    pub value: serde_json::Value,
    pub category: String,
    pub value_type: String,
    pub secret: bool,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingAuditLog {
    pub key: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: serde_json::Value,
    pub reason: Option<String>,
    pub actor: String,
    pub ip: String,
    pub at: DateTime<Utc>,
}

impl SystemSetting {
    /// Apply a new value, returning the audit entry describing the
    /// transition (old -> new).
    pub fn apply(
        &mut self,
        new_value: serde_json::Value,
        reason: Option<String>,
        actor: impl Into<String>,
        ip: impl Into<String>,
        now: DateTime<Utc>,
    ) -> SettingAuditLog {
        let old_value = Some(self.value.clone());
        self.value = new_value.clone();
        self.version += 1;
        SettingAuditLog {
            key: self.key.clone(),
            old_value,
            new_value,
            reason,
            actor: actor.into(),
            ip: ip.into(),
            at: now,
        }
    }
}
