//! Progress Broadcaster (C6, spec.md §4.6): subscribes to the progress
//! subject hierarchy, reconciles the metadata store, fans a uniform
//! client event out to every connected WebSocket, and fires an operator
//! notification on terminal transitions of the transcode pipeline.

use std::sync::Arc;

use backplane_bus::JobBus;
use backplane_core::domain::{SubtitleStatus, VideoStatus};
use backplane_core::events::{ClientEvent, ClientEventData, ClientEventType, ClientStatus, EventPipeline, PipelineKind, ProgressEvent, ProgressStatus};
use backplane_core::notifier::Notifier;
use backplane_store::MetadataStore;
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

/// Process-wide fan-out point for WebSocket clients (spec.md §9, "global
/// singletons... treat as owned by the process lifecycle"). The server
/// crate's WebSocket handler subscribes here directly.
#[derive(Clone)]
pub struct ClientRegistry {
    sender: broadcast::Sender<ClientEvent>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }
}

impl ClientRegistry {
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: ClientEvent) {
        let _ = self.sender.send(event);
    }
}

/// Bounded title lookup so the broadcaster does not round-trip the
/// metadata store on every single progress tick (spec.md §4.6 step 5).
pub struct TitleCache {
    cache: Mutex<LruCache<String, String>>,
}

impl TitleCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(std::num::NonZeroUsize::new(capacity.max(1)).unwrap())),
        }
    }

    async fn title_for(&self, video_id: &str, store: &dyn MetadataStore) -> String {
        if let Some(title) = self.cache.lock().get(video_id).cloned() {
            return title;
        }
        let title = store.get_video(video_id).await.map(|v| v.title).unwrap_or_default();
        self.cache.lock().put(video_id.to_string(), title.clone());
        title
    }

    pub fn invalidate(&self, video_id: &str) {
        self.cache.lock().pop(video_id);
    }
}

pub struct ProgressBroadcaster {
    store: Arc<dyn MetadataStore>,
    registry: ClientRegistry,
    titles: TitleCache,
    notifier: Arc<dyn Notifier>,
    orchestrator: crate::chaining::PipelineOrchestrator,
}

impl ProgressBroadcaster {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        registry: ClientRegistry,
        title_cache_capacity: usize,
        notifier: Arc<dyn Notifier>,
        orchestrator: crate::chaining::PipelineOrchestrator,
    ) -> Self {
        Self {
            store,
            registry,
            titles: TitleCache::new(title_cache_capacity),
            notifier,
            orchestrator,
        }
    }

    pub fn registry(&self) -> ClientRegistry {
        self.registry.clone()
    }

    /// Subscribe to every progress subject and process events until the
    /// subscription ends. Runs forever in its own task in production.
    pub async fn run(&self, bus: Arc<dyn JobBus>) {
        let mut sub = match bus.subscribe_progress("progress.>").await {
            Ok(sub) => sub,
            Err(err) => {
                warn!(error = %err, "failed to subscribe to progress events");
                return;
            }
        };

        while let Some(payload) = sub.next().await {
            let event: ProgressEvent = match serde_json::from_slice(&payload) {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "unparseable progress event, dropping");
                    continue;
                }
            };
            self.handle_event(event).await;
        }
    }

    /// Steps 1-7 of spec.md §4.6, made directly callable for tests.
    pub async fn handle_event(&self, event: ProgressEvent) {
        if event.video_id.is_empty() {
            return;
        }

        let kind = match event.pipeline {
            EventPipeline::Transcode => PipelineKind::Transcode,
            EventPipeline::Subtitle => PipelineKind::Subtitle,
            EventPipeline::Gallery => PipelineKind::Gallery,
            EventPipeline::Reel => PipelineKind::Reel,
            EventPipeline::WarmCache => PipelineKind::WarmCache,
        };

        self.reconcile(kind, &event).await;

        let client_status = ClientStatus::from_progress(event.status, event.progress);
        let event_type = match (kind, event.status) {
            (PipelineKind::Subtitle, _) => ClientEventType::SubtitleProgress,
            (PipelineKind::Transcode, ProgressStatus::Completed) => ClientEventType::TranscodeCompleted,
            (PipelineKind::Transcode, ProgressStatus::Failed) => ClientEventType::TranscodeFailed,
            _ => ClientEventType::VideoProgress,
        };

        let title = self.titles.title_for(&event.video_id, self.store.as_ref()).await;
        let current_step = event.message.clone().unwrap_or_else(|| step_label(event.stage.as_deref(), event.progress));

        let client_event = ClientEvent {
            kind: event_type,
            data: ClientEventData {
                video_id: event.video_id.clone(),
                video_code: event.video_code.clone(),
                video_title: title,
                kind,
                status: client_status,
                progress: event.progress,
                current_step,
                message: event.message.clone(),
                error_message: event.error.clone(),
                quality: event.quality.clone(),
                output_path: event.output_path.clone(),
                subtitle_id: event.subtitle_id.clone(),
                language: event.current_language.clone(),
            },
        };
        self.registry.publish(client_event);

        if kind == PipelineKind::Transcode && matches!(event.status, ProgressStatus::Completed | ProgressStatus::Failed) {
            let verb = if event.status == ProgressStatus::Completed { "completed" } else { "failed" };
            self.notifier
                .notify(&format!("video {} ({}) transcode {verb}", event.video_code, event.video_id))
                .await;
        }
    }

    async fn reconcile(&self, kind: PipelineKind, event: &ProgressEvent) {
        match kind {
            PipelineKind::Subtitle => self.reconcile_subtitle(event).await,
            // Gallery, reel and warm-cache status are each owned by their
            // own stage executor's `on_success`/`on_retry`/`on_exhausted`
            // (`update_video_gallery_status`, `complete_reel`/`fail_reel`,
            // `update_video_cache_status`); reconciling the *video*'s
            // transcode state from one of their progress events would
            // stamp a reel's MP4 or a cache-warm tick onto
            // `master_hls_path`/`status` (spec.md §4.6 step 6 only covers
            // the transcode pipeline).
            PipelineKind::Gallery | PipelineKind::Reel | PipelineKind::WarmCache => {}
            PipelineKind::Transcode | PipelineKind::Upload => self.reconcile_video(event).await,
        }
    }

    /// Idempotent reconciliation matching spec.md §4.6 step 6 and the
    /// out-of-order example in §8 ("a late `processing` event is a no-op
    /// once status is already `ready`").
    async fn reconcile_video(&self, event: &ProgressEvent) {
        let Some(video) = self.store.get_video(&event.video_id).await else {
            return;
        };

        match event.status {
            ProgressStatus::Processing => {
                if video.status == VideoStatus::Processing {
                    let _ = self.store.refresh_video_processing_started_at(&event.video_id, Utc::now()).await;
                } else if video.status == VideoStatus::Pending || video.status == VideoStatus::Queued {
                    let _ = self.store.begin_video_processing(&event.video_id, Utc::now()).await;
                }
            }
            ProgressStatus::Completed => {
                if let Some(hls_path) = &event.output_path {
                    let _ = self.store.complete_video(&event.video_id, hls_path.clone(), event.audio_path.clone()).await;
                }
                self.titles.invalidate(&event.video_id);
                if let Some(video) = self.store.get_video(&event.video_id).await {
                    self.orchestrator.on_transcode_completed(&video).await;
                    self.orchestrator.on_video_ready(&video).await;
                }
            }
            // Retry/DLQ bookkeeping (retry_count, error_history, the
            // terminal `queued`/`dead_letter` decision) belongs solely to
            // `ConsumerRuntime::handle_one`, which has already called
            // `fail_video` with the real attempt count and cap by the time
            // this event is published. Reconciling it again here would
            // double-charge `retry_count` against the same cap and could
            // flip a video to `dead_letter` after half as many real
            // failures as configured (spec.md §4.5 step 5, §8 scenario 2).
            ProgressStatus::Failed => {}
        }
    }

    async fn reconcile_subtitle(&self, event: &ProgressEvent) {
        let Some(subtitle_id) = &event.subtitle_id else {
            // `detect` carries no subtitle row (it writes the video's
            // detected_language directly); nothing to reconcile here.
            return;
        };
        let Some(subtitle) = self.store.get_subtitle(subtitle_id).await else {
            return;
        };

        match event.status {
            ProgressStatus::Processing => {
                if matches!(subtitle.status, SubtitleStatus::Pending | SubtitleStatus::Queued) {
                    let target = if event.stage.as_deref() == Some("translate") {
                        SubtitleStatus::Translating
                    } else {
                        SubtitleStatus::Processing
                    };
                    let _ = self.store.begin_subtitle_stage(subtitle_id, target, Utc::now()).await;
                }
            }
            ProgressStatus::Completed => {
                if let Some(path) = &event.output_path {
                    let _ = self.store.complete_subtitle(subtitle_id, path.clone(), None).await;
                }
            }
            ProgressStatus::Failed => {
                let _ = self.store.fail_subtitle(subtitle_id, event.error.clone().unwrap_or_default()).await;
            }
        }
    }
}

fn step_label(stage: Option<&str>, progress: u8) -> String {
    if let Some(stage) = stage {
        return stage.to_string();
    }
    match progress {
        0 => "queued".to_string(),
        1..=33 => "starting".to_string(),
        34..=66 => "processing".to_string(),
        67..=99 => "finishing".to_string(),
        _ => "done".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use backplane_bus::testing::InMemoryJobBus;
    use backplane_bus::Publisher;
    use backplane_core::config::OrchestratorConfig;
    use backplane_core::domain::Video;
    use backplane_core::notifier::NullNotifier;
    use backplane_store::InMemoryStore;

    use super::*;

    fn broadcaster(store: Arc<dyn MetadataStore>) -> ProgressBroadcaster {
        let bus: Arc<dyn JobBus> = Arc::new(InMemoryJobBus::new());
        let orchestrator = crate::chaining::PipelineOrchestrator::new(Publisher::new(bus, store.clone()), OrchestratorConfig::default());
        ProgressBroadcaster::new(store, ClientRegistry::default(), 16, Arc::new(NullNotifier), orchestrator)
    }

    fn progress_event(video_id: &str, video_code: &str, status: ProgressStatus, progress: u8, output_path: Option<String>) -> ProgressEvent {
        ProgressEvent {
            video_id: video_id.to_string(),
            video_code: video_code.to_string(),
            pipeline: backplane_core::events::EventPipeline::Transcode,
            status,
            stage: None,
            progress,
            quality: None,
            message: None,
            error: None,
            output_path,
            audio_path: None,
            worker_id: None,
            subtitle_id: None,
            current_language: None,
            reel_id: None,
            file_size: None,
        }
    }

    /// spec.md §8 scenario 6: a late `processing` event arriving after the
    /// video has already reached `completed`/`ready` must not regress its
    /// status or artifacts.
    #[tokio::test]
    async fn late_processing_event_after_completed_is_a_no_op() {
        let store: Arc<dyn MetadataStore> = InMemoryStore::new();
        store.put_video(Video::new("v9", "xyz", "owner1")).await;
        store.begin_video_processing("v9", Utc::now()).await.unwrap();

        let broadcaster = broadcaster(store.clone());

        broadcaster
            .handle_event(progress_event("v9", "xyz", ProgressStatus::Completed, 100, Some("hls/xyz/master.m3u8".to_string())))
            .await;

        let ready = store.get_video("v9").await.unwrap();
        assert_eq!(ready.status, VideoStatus::Ready);
        assert_eq!(ready.master_hls_path.as_deref(), Some("hls/xyz/master.m3u8"));

        // A stale `processing` tick from a retried/slow worker arrives after
        // the fact; it must not move a `ready` video backwards.
        broadcaster.handle_event(progress_event("v9", "xyz", ProgressStatus::Processing, 50, None)).await;

        let after = store.get_video("v9").await.unwrap();
        assert_eq!(after.status, VideoStatus::Ready);
        assert_eq!(after.master_hls_path.as_deref(), Some("hls/xyz/master.m3u8"));
        assert_eq!(after.processing_started_at, ready.processing_started_at);
    }

    /// A reel export's `completed` event carries the reel's own MP4 as
    /// `output_path`; it must never be reconciled onto the video's
    /// `master_hls_path`, nor treated as a transcode-pipeline notifier
    /// trigger.
    #[tokio::test]
    async fn reel_completed_event_does_not_touch_video_transcode_state() {
        let store: Arc<dyn MetadataStore> = InMemoryStore::new();
        let mut video = Video::new("v9", "xyz", "owner1");
        video.status = VideoStatus::Ready;
        video.master_hls_path = Some("hls/xyz/master.m3u8".to_string());
        store.put_video(video).await;

        let broadcaster = broadcaster(store.clone());

        let mut event = progress_event("v9", "xyz", ProgressStatus::Completed, 100, Some("reels/r1/output.mp4".to_string()));
        event.pipeline = EventPipeline::Reel;
        event.reel_id = Some("r1".to_string());
        broadcaster.handle_event(event).await;

        let after = store.get_video("v9").await.unwrap();
        assert_eq!(after.master_hls_path.as_deref(), Some("hls/xyz/master.m3u8"));
    }
}
