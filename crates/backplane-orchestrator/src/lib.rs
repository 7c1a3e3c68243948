pub mod broadcaster;
pub mod chaining;
pub mod dlq;
pub mod notifier;
pub mod recovery;

pub use broadcaster::{ClientRegistry, ProgressBroadcaster, TitleCache};
pub use chaining::PipelineOrchestrator;
pub use dlq::DlqSubscriber;
pub use notifier::WebhookNotifier;
pub use recovery::StuckJobRecovery;
