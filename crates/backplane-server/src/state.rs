use std::sync::Arc;

use async_trait::async_trait;
use backplane_access::{AccessTokenConfig, EmbedPolicyCache, StreamAccessGate, WhitelistCacheConfig, WhitelistSource};
use backplane_core::domain::WhitelistProfile;
use backplane_orchestrator::ClientRegistry;
use backplane_store::MetadataStore;

/// Bridges the Metadata Store's whitelist rows into the `backplane_access`
/// cache's `WhitelistSource` port, kept in a separate file-scope type so
/// neither crate has to depend on the other.
pub struct StoreWhitelistSource {
    pub store: Arc<dyn MetadataStore>,
}

#[async_trait]
impl WhitelistSource for StoreWhitelistSource {
    async fn active_profiles(&self) -> Vec<WhitelistProfile> {
        self.store.list_active_whitelist_profiles().await
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub gate: Arc<StreamAccessGate>,
    pub whitelist_source: Arc<StoreWhitelistSource>,
    pub whitelist_cache: Arc<EmbedPolicyCache>,
    pub registry: ClientRegistry,
    pub cdn_base_url: String,
}

impl AppState {
    pub fn new(store: Arc<dyn MetadataStore>, signing_secret: &str, token_config: AccessTokenConfig, cache_config: WhitelistCacheConfig, registry: ClientRegistry, cdn_base_url: String) -> Self {
        Self {
            whitelist_source: Arc::new(StoreWhitelistSource { store: store.clone() }),
            store,
            gate: Arc::new(StreamAccessGate::new(signing_secret.as_bytes(), token_config)),
            whitelist_cache: Arc::new(EmbedPolicyCache::new(cache_config)),
            registry,
            cdn_base_url,
        }
    }
}
