//! Worker process: wires the configured Job Bus and Metadata Store into
//! one `ConsumerRuntime` per pipeline and runs them concurrently until
//! interrupted.

use std::sync::Arc;

use backplane_bus::testing::InMemoryJobBus;
use backplane_bus::{JobBus, NatsJobBus};
use backplane_core::config::BackplaneConfig;
use backplane_store::{InMemoryStore, MetadataStore};
use backplane_worker::runtime::{ConsumerRuntime, RuntimeConfig};
use backplane_worker::stages::{
    GalleryExecutor, ReelExecutor, SubtitleDetectExecutor, SubtitleTranscribeExecutor, SubtitleTranslateExecutor, TranscodeExecutor, WarmCacheExecutor,
};
use backplane_worker::ports::reference::{
    ReferenceCdnWarmer, ReferenceGalleryExtractor, ReferenceLanguageDetector, ReferenceNsfwClassifier, ReferenceReelCompositor, ReferenceTranscoder, ReferenceTranscriber, ReferenceTranslator,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const APP_NAME: &str = "backplane-worker";
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

    let worker_id = std::env::var("BACKPLANE_WORKER_ID").unwrap_or_else(|_| format!("worker-{}", std::process::id()));
    let runtime_config = RuntimeConfig::default();
    let cancel = CancellationToken::new();

    let transcode = ConsumerRuntime::new(
        bus.clone(),
        store.clone(),
        format!("{worker_id}-transcode"),
        TranscodeExecutor {
            transcoder: Arc::new(ReferenceTranscoder),
            max_retries: config.retry.transcode_max_retries,
        },
        runtime_config,
    );
    let subtitle_detect = ConsumerRuntime::new(
        bus.clone(),
        store.clone(),
        format!("{worker_id}-subtitle-detect"),
        SubtitleDetectExecutor {
            detector: Arc::new(ReferenceLanguageDetector),
            max_retries: config.retry.subtitle_max_retries,
        },
        runtime_config,
    );
    let subtitle_transcribe = ConsumerRuntime::new(
        bus.clone(),
        store.clone(),
        format!("{worker_id}-subtitle-transcribe"),
        SubtitleTranscribeExecutor {
            transcriber: Arc::new(ReferenceTranscriber),
            max_retries: config.retry.subtitle_max_retries,
        },
        runtime_config,
    );
    let subtitle_translate = ConsumerRuntime::new(
        bus.clone(),
        store.clone(),
        format!("{worker_id}-subtitle-translate"),
        SubtitleTranslateExecutor {
            translator: Arc::new(ReferenceTranslator),
            max_retries: config.retry.subtitle_max_retries,
        },
        runtime_config,
    );
    let reel = ConsumerRuntime::new(
        bus.clone(),
        store.clone(),
        format!("{worker_id}-reel"),
        ReelExecutor {
            compositor: Arc::new(ReferenceReelCompositor),
            max_retries: config.retry.reel_max_retries,
        },
        runtime_config,
    );
    let warm_cache = ConsumerRuntime::new(
        bus.clone(),
        store.clone(),
        format!("{worker_id}-warm-cache"),
        WarmCacheExecutor {
            warmer: Arc::new(ReferenceCdnWarmer),
            max_retries: config.retry.warm_cache_max_retries,
        },
        runtime_config,
    );
    let gallery = ConsumerRuntime::new(
        bus.clone(),
        store.clone(),
        format!("{worker_id}-gallery"),
        GalleryExecutor {
            extractor: Arc::new(ReferenceGalleryExtractor),
            classifier: Arc::new(ReferenceNsfwClassifier),
            blobs: Arc::new(backplane_store::FilesystemBlobStore::new("./data/blobs", "http://localhost:9000")),
            store: store.clone(),
            max_retries: config.retry.gallery_max_retries,
        },
        runtime_config,
    );

    tokio::spawn({
        let cancel = cancel.clone();
        async move { transcode.run(cancel).await }
    });
    tokio::spawn({
        let cancel = cancel.clone();
        async move { subtitle_detect.run(cancel).await }
    });
    tokio::spawn({
        let cancel = cancel.clone();
        async move { subtitle_transcribe.run(cancel).await }
    });
    tokio::spawn({
        let cancel = cancel.clone();
        async move { subtitle_translate.run(cancel).await }
    });
    tokio::spawn({
        let cancel = cancel.clone();
        async move { reel.run(cancel).await }
    });
    tokio::spawn({
        let cancel = cancel.clone();
        async move { warm_cache.run(cancel).await }
    });
    tokio::spawn({
        let cancel = cancel.clone();
        async move { gallery.run(cancel).await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, cancelling runtimes");
    cancel.cancel();

    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "backplane_worker=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
