//! Layered configuration shared by every binary in the workspace.
//!
//! Mirrors the teacher's `ServerConfig` / `ConfigFile` split: a typed
//! struct with sane defaults, optionally overlaid from a TOML file, with
//! a handful of fields meant to be overridden from the environment
//! (secrets, connection URLs) rather than checked into a config file.

use serde::{Deserialize, Serialize};

/// Job bus connection and retention settings (component C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// NATS server URL, e.g. "nats://127.0.0.1:4222". Overridden by
    /// `BACKPLANE_BUS_URL` if set.
    pub url: String,
    /// Max redeliveries before a pipeline's messages route to the DLQ.
    pub max_deliver: i64,
    /// Ack-wait deadline before the bus redelivers an unacked message.
    pub ack_wait_secs: u64,
    /// Retention window for per-pipeline work-queue streams.
    pub stream_retention_hours: u64,
    /// Retention window for the dead-letter stream.
    pub dlq_retention_days: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            max_deliver: 3,
            ack_wait_secs: 60,
            stream_retention_hours: 24,
            dlq_retention_days: 30,
        }
    }
}

/// Retry/DLQ policy (component C7), one cap per pipeline kind as
/// described in spec.md §4.7 ("each pipeline has a per-entity retry cap,
/// default 3").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub transcode_max_retries: u32,
    pub subtitle_max_retries: u32,
    pub reel_max_retries: u32,
    pub gallery_max_retries: u32,
    pub warm_cache_max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transcode_max_retries: 3,
            subtitle_max_retries: 3,
            reel_max_retries: 3,
            gallery_max_retries: 3,
            warm_cache_max_retries: 3,
        }
    }
}

/// Stuck-job recovery sweep settings (component C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// How long a video may sit in `processing` without a fresh progress
    /// event before the sweep considers it stuck.
    pub video_grace_secs: u64,
    /// Same, for subtitle rows in `detecting`/`processing`/`translating`.
    pub subtitle_grace_secs: u64,
    /// How often the periodic sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            video_grace_secs: 15 * 60,
            subtitle_grace_secs: 15 * 60,
            sweep_interval_secs: 60,
        }
    }
}

/// Orchestrator chaining toggles. spec.md §9 leaves these as an explicit
/// open question ("the source treats gallery and warm-cache chaining as
/// configurable but does not specify defaults"); DESIGN.md records the
/// decision to default both off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub auto_chain_subtitle_detect: bool,
    pub auto_enqueue_warm_cache_on_ready: bool,
    pub auto_enqueue_gallery_on_ready: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            auto_chain_subtitle_detect: true,
            auto_enqueue_warm_cache_on_ready: false,
            auto_enqueue_gallery_on_ready: false,
        }
    }
}

/// Stream Access Gate settings (component C10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Secret used to HMAC-sign tokens. Overridden by
    /// `BACKPLANE_ACCESS_SECRET`; never checked into a config file.
    #[serde(default)]
    pub signing_secret: String,
    pub token_ttl_secs: u64,
    pub cookie_domain: Option<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            signing_secret: String::new(),
            token_ttl_secs: 4 * 60 * 60,
            cookie_domain: None,
        }
    }
}

/// Whitelist cache settings (component C11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistCacheConfig {
    pub capacity: usize,
    pub positive_ttl_secs: u64,
    pub negative_ttl_secs: u64,
}

impl Default for WhitelistCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            positive_ttl_secs: 300,
            negative_ttl_secs: 30,
        }
    }
}

/// Title cache settings used by the Progress Broadcaster (spec.md §4.6
/// step 5, "bounded in-memory LRU").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleCacheConfig {
    pub capacity: usize,
}

impl Default for TitleCacheConfig {
    fn default() -> Self {
        Self { capacity: 2048 }
    }
}

/// HTTP/WebSocket edge settings (components C6's client-facing half and
/// C10), analogous to the teacher's `ServerConfig::socket_addr()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub cdn_base_url: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            cdn_base_url: "https://cdn.example.test".to_string(),
        }
    }
}

/// Top-level configuration composing all of the above, analogous to the
/// teacher's `ServerConfig`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackplaneConfig {
    pub bus: BusConfig,
    pub retry: RetryConfig,
    pub recovery: RecoveryConfig,
    pub orchestrator: OrchestratorConfig,
    pub access: AccessConfig,
    pub whitelist_cache: WhitelistCacheConfig,
    pub title_cache: TitleCacheConfig,
    pub http: HttpConfig,
    pub log_level: Option<String>,
    pub notifier_webhook_url: Option<String>,
}

impl BackplaneConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any section the file omits (every section implements `Default`).
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: BackplaneConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment overrides for values that should never live in a
    /// checked-in config file.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("BACKPLANE_BUS_URL") {
            self.bus.url = url;
        }
        if let Ok(secret) = std::env::var("BACKPLANE_ACCESS_SECRET") {
            self.access.signing_secret = secret;
        }
        if let Ok(webhook) = std::env::var("BACKPLANE_NOTIFIER_WEBHOOK_URL") {
            self.notifier_webhook_url = Some(webhook);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BackplaneConfig::default();
        assert_eq!(config.retry.transcode_max_retries, 3);
        assert_eq!(config.bus.dlq_retention_days, 30);
        assert!(!config.orchestrator.auto_enqueue_gallery_on_ready);
    }

    #[test]
    fn env_overrides_take_precedence() {
        std::env::set_var("BACKPLANE_BUS_URL", "nats://example:4222");
        let config = BackplaneConfig::default().with_env_overrides();
        assert_eq!(config.bus.url, "nats://example:4222");
        std::env::remove_var("BACKPLANE_BUS_URL");
    }
}
