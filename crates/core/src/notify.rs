//! HTTP client for the internal notification/event pipeline.
//!
//! Emission is fire-and-forget from the workflow's point of view: the
//! orchestrator logs a failed emit and carries on. The pipeline is keyed by
//! event name (`declared`, `registered`, `void`, ...).

use crate::collaborators::EventNotifier;
use crate::{WorkflowError, WorkflowResult};
use async_trait::async_trait;

/// `reqwest`-backed [`EventNotifier`].
#[derive(Clone, Debug)]
pub struct HttpEventNotifier {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEventNotifier {
    /// A notifier for the given base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EventNotifier for HttpEventNotifier {
    async fn emit(&self, event: &str, payload: &serde_json::Value) -> WorkflowResult<()> {
        let url = format!("{}/events/{event}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|err| WorkflowError::Notification(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowError::Notification(format!(
                "{url} responded {status}"
            )));
        }
        Ok(())
    }
}
