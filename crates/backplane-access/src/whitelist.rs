//! Whitelist & Embed Policy (C11, spec.md §4.11). Resolves a referring
//! domain to display policy (watermark, ordered pre-rolls, thumbnail
//! override) through an LRU cache with separate positive/negative TTLs,
//! so a miss doesn't hammer the metadata store on every embed request.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use backplane_core::domain::whitelist::{normalize_domain, WhitelistProfile};
use lru::LruCache;
use parking_lot::Mutex;

/// Supplies the active profile set a domain may match against. In
/// production this is backed by the metadata store; tests can supply a
/// fixed in-memory list.
#[async_trait]
pub trait WhitelistSource: Send + Sync {
    async fn active_profiles(&self) -> Vec<WhitelistProfile>;
}

#[derive(Debug, Clone, Copy)]
pub struct WhitelistCacheConfig {
    pub capacity: usize,
    pub positive_ttl: Duration,
    pub negative_ttl: Duration,
}

impl Default for WhitelistCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            positive_ttl: Duration::from_secs(300),
            negative_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
enum CacheEntry {
    Hit { profile: WhitelistProfile, cached_at: Instant },
    Miss { cached_at: Instant },
}

impl CacheEntry {
    fn is_expired(&self, config: &WhitelistCacheConfig) -> bool {
        match self {
            CacheEntry::Hit { cached_at, .. } => cached_at.elapsed() > config.positive_ttl,
            CacheEntry::Miss { cached_at } => cached_at.elapsed() > config.negative_ttl,
        }
    }
}

/// Outcome of an embed-policy lookup for a normalized domain.
pub enum PolicyLookup {
    Allowed(WhitelistProfile),
    Denied,
}

pub struct EmbedPolicyCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    config: WhitelistCacheConfig,
}

impl EmbedPolicyCache {
    pub fn new(config: WhitelistCacheConfig) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(config.capacity.max(1)).unwrap(),
            )),
            config,
        }
    }

    /// Invalidate a single domain so the next lookup recomputes it
    /// (spec.md §4.11 "single-domain ... invalidation").
    pub fn invalidate(&self, domain: &str) {
        let domain = normalize_domain(domain);
        self.cache.lock().pop(&domain);
    }

    /// Drop the whole cache (spec.md §4.11 "full-flush").
    pub fn invalidate_all(&self) {
        self.cache.lock().clear();
    }

    /// Resolve `raw_domain` to a policy, consulting the cache first and
    /// falling back to `source` on a miss or expired entry.
    pub async fn resolve(&self, raw_domain: &str, source: &dyn WhitelistSource) -> PolicyLookup {
        let domain = normalize_domain(raw_domain);

        if let Some(entry) = self.cache.lock().get(&domain).cloned() {
            if !entry.is_expired(&self.config) {
                return match entry {
                    CacheEntry::Hit { profile, .. } => PolicyLookup::Allowed(profile),
                    CacheEntry::Miss { .. } => PolicyLookup::Denied,
                };
            }
        }

        let profiles = source.active_profiles().await;
        let matched = profiles.into_iter().find(|p| p.matches(&domain));

        let entry = match matched {
            Some(profile) => CacheEntry::Hit {
                profile: profile.clone(),
                cached_at: Instant::now(),
            },
            None => CacheEntry::Miss { cached_at: Instant::now() },
        };
        let result = match &entry {
            CacheEntry::Hit { profile, .. } => PolicyLookup::Allowed(profile.clone()),
            CacheEntry::Miss { .. } => PolicyLookup::Denied,
        };
        self.cache.lock().put(domain, entry);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backplane_core::domain::whitelist::{AdType, PreRollAd, WatermarkPosition, WatermarkSettings};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        profiles: Vec<WhitelistProfile>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WhitelistSource for FixedSource {
        async fn active_profiles(&self) -> Vec<WhitelistProfile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.profiles.clone()
        }
    }

    fn profile(pattern: &str) -> WhitelistProfile {
        WhitelistProfile {
            id: "p1".into(),
            name: "demo".into(),
            active: true,
            domain_patterns: vec![pattern.to_string()],
            watermark: Some(WatermarkSettings {
                url: "wm.png".into(),
                position: WatermarkPosition::Br,
                opacity: 0.5,
                pixel_size: 64,
                vertical_offset: 0,
            }),
            pre_rolls: vec![PreRollAd {
                kind: AdType::Video,
                url: "ad.mp4".into(),
                duration_secs: None,
                skip_after_secs: 5.0,
                click_url: None,
                click_text: None,
                click_title: None,
                order: 0,
            }],
            thumbnail_override: None,
        }
    }

    #[tokio::test]
    async fn wildcard_subdomain_resolves_to_profile() {
        let source = FixedSource {
            profiles: vec![profile("*.game1.com")],
            calls: AtomicUsize::new(0),
        };
        let cache = EmbedPolicyCache::new(WhitelistCacheConfig::default());
        match cache.resolve("https://sub.game1.com/embed", &source).await {
            PolicyLookup::Allowed(p) => assert_eq!(p.id, "p1"),
            PolicyLookup::Denied => panic!("expected allow"),
        }
    }

    #[tokio::test]
    async fn unmatched_domain_is_denied_and_cached() {
        let source = FixedSource {
            profiles: vec![profile("*.game1.com")],
            calls: AtomicUsize::new(0),
        };
        let cache = EmbedPolicyCache::new(WhitelistCacheConfig::default());
        assert!(matches!(cache.resolve("game2.com", &source).await, PolicyLookup::Denied));
        assert!(matches!(cache.resolve("game2.com", &source).await, PolicyLookup::Denied));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1, "negative result should be cached");
    }

    #[tokio::test]
    async fn positive_result_is_cached_without_resolving_again() {
        let source = FixedSource {
            profiles: vec![profile("*.game1.com")],
            calls: AtomicUsize::new(0),
        };
        let cache = EmbedPolicyCache::new(WhitelistCacheConfig::default());
        let _ = cache.resolve("sub.game1.com", &source).await;
        let _ = cache.resolve("sub.game1.com", &source).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let source = FixedSource {
            profiles: vec![profile("*.game1.com")],
            calls: AtomicUsize::new(0),
        };
        let cache = EmbedPolicyCache::new(WhitelistCacheConfig::default());
        let _ = cache.resolve("sub.game1.com", &source).await;
        cache.invalidate("sub.game1.com");
        let _ = cache.resolve("sub.game1.com", &source).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
