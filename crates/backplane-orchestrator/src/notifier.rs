//! Default `Notifier` (spec.md §1, §4.9) backed by an HTTP webhook, the
//! concrete external-collaborator shape spec.md §4.5 step 7 calls out
//! ("e.g., chat webhook").

use async_trait::async_trait;
use backplane_core::notifier::Notifier;
use serde::Serialize;

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) {
        let result = self.client.post(&self.url).json(&WebhookPayload { text: message }).send().await;
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to deliver operator notification");
        }
    }
}
