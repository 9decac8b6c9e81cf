use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

pub struct ApiClient {
    client: Client,
    base_url: String,
    webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub connections: usize,
    pub buffered_events: usize,
    pub queued_recoveries: usize,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String, webhook_secret: Option<String>) -> Self {
        Self {
            client,
            base_url,
            webhook_secret,
        }
    }

    /// Post a `newMessage` event as the ingestion side would.
    pub async fn post_new_message(&self, conversation_sid: &str, message_sid: &str) -> Result<()> {
        self.post_event(json!({
            "type": "newMessage",
            "data": {
                "conversationSid": conversation_sid,
                "messageSid": message_sid,
                "body": "sse-test-client ping",
                "author": "whatsapp:+15550000000"
            }
        }))
        .await
    }

    pub async fn post_delivery_status(&self, message_sid: &str, status: &str) -> Result<()> {
        self.post_event(json!({
            "type": "deliveryStatusUpdate",
            "data": {
                "messageSid": message_sid,
                "status": status
            }
        }))
        .await
    }

    async fn post_event(&self, body: Value) -> Result<()> {
        let url = format!("{}/webhooks/events", self.base_url);

        let mut request = self.client.post(&url).json(&body);
        if let Some(secret) = &self.webhook_secret {
            request = request.header(WEBHOOK_SECRET_HEADER, secret);
        }

        let response = request.send().await.context("Failed to post event")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Failed to post event: {} - Response: {}", status, body);
        }

        Ok(())
    }

    pub async fn relay_status(&self) -> Result<RelayStatus> {
        let url = format!("{}/sse/status", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get relay status")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to get relay status: {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse relay status")
    }
}
