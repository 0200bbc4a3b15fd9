use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::{EscalationEvent, Notifier, NotifyError};

/// Posts escalation events as JSON to an operator-configured endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    endpoint: Url,
}

impl WebhookNotifier {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &EscalationEvent) -> Result<(), NotifyError> {
        debug!("Posting {:?} for case {} to {}", event.kind, event.case_id, self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(event)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
