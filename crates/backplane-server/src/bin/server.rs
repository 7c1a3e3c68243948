use std::sync::Arc;

use backplane_bus::testing::InMemoryJobBus;
use backplane_bus::{JobBus, NatsJobBus, Publisher};
use backplane_core::config::BackplaneConfig;
use backplane_core::notifier::{NullNotifier, Notifier};
use backplane_orchestrator::{ClientRegistry, DlqSubscriber, PipelineOrchestrator, ProgressBroadcaster, StuckJobRecovery, WebhookNotifier};
use backplane_server::state::AppState;
use backplane_store::{InMemoryStore, MetadataStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const APP_NAME: &str = "backplane-server";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        BackplaneConfig::from_file(&config_path).unwrap_or_default()
    } else {
        BackplaneConfig::default()
    }
    .with_env_overrides();

    let bus: Arc<dyn JobBus> = if config.bus.url.is_empty() {
        Arc::new(InMemoryJobBus::new())
    } else {
        match NatsJobBus::connect(&config.bus.url, backplane_bus::JobBusConfig::default()).await {
            Ok(bus) => Arc::new(bus),
            Err(err) => {
                tracing::warn!(error = %err, "failed to connect to job bus, falling back to in-process bus");
                Arc::new(InMemoryJobBus::new())
            }
        }
    };
    let store: Arc<dyn MetadataStore> = InMemoryStore::new();

    let notifier: Arc<dyn Notifier> = match &config.notifier_webhook_url {
        Some(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(url.clone())),
        _ => Arc::new(NullNotifier),
    };

    let registry = ClientRegistry::default();
    let orchestrator = PipelineOrchestrator::new(Publisher::new(bus.clone(), store.clone()), config.orchestrator.clone());
    let broadcaster = Arc::new(ProgressBroadcaster::new(store.clone(), registry.clone(), config.title_cache.capacity, notifier.clone(), orchestrator));
    let recovery = Arc::new(StuckJobRecovery::new(store.clone(), config.recovery.clone(), config.retry.transcode_max_retries));
    let dlq = Arc::new(DlqSubscriber::new(bus.clone(), notifier.clone()));

    let cancel = CancellationToken::new();

    {
        let broadcaster = broadcaster.clone();
        let bus = bus.clone();
        tokio::spawn(async move { broadcaster.run(bus).await });
    }
    {
        let recovery = recovery.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { recovery.run(cancel).await });
    }
    {
        let dlq = dlq.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { dlq.run(cancel).await });
    }

    // Cookie domain is sourced from config at process startup and lives
    // for the process lifetime, so leaking it into a 'static str is safe.
    let cookie_domain: Option<&'static str> = config.access.cookie_domain.clone().map(|d| Box::leak(d.into_boxed_str()) as &'static str);
    let token_config = backplane_access::AccessTokenConfig {
        ttl_secs: config.access.token_ttl_secs as i64,
        cookie_domain,
    };
    let cache_config = backplane_access::WhitelistCacheConfig {
        capacity: config.whitelist_cache.capacity,
        positive_ttl: std::time::Duration::from_secs(config.whitelist_cache.positive_ttl_secs),
        negative_ttl: std::time::Duration::from_secs(config.whitelist_cache.negative_ttl_secs),
    };

    let state = Arc::new(AppState::new(store, &config.access.signing_secret, token_config, cache_config, registry, config.http.cdn_base_url.clone()));
    let app = backplane_server::create_router(state);

    let addr: std::net::SocketAddr = config.http.bind_addr.parse()?;
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    cancel.cancel();
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "backplane_server=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
