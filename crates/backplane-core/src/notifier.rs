//! Operator notification port. Out of scope per spec.md §1 ("the actual
//! ... mechanics" of any one channel are an external collaborator); only
//! the interface is owned here. The DLQ Subscriber (C9) and terminal
//! transcode notifications (C6) both go through this trait.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// A notifier that drops every message, for tests and for running without
/// an operator channel configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, message: &str) {
        tracing::debug!(message, "null notifier dropped alert");
    }
}
