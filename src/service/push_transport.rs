// service/push_transport.rs
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::service::error::CollaboratorError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: Value,
}

/// Best-effort delivery to a device or browser. Callers never wait on it.
#[async_trait]
pub trait PushTransport: Send + Sync + std::fmt::Debug {
    async fn send(&self, account_id: &str, message: &PushMessage) -> Result<(), CollaboratorError>;
}

/// Writes pushes to the log. Used when no push endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct LogPushTransport;

#[async_trait]
impl PushTransport for LogPushTransport {
    async fn send(&self, account_id: &str, message: &PushMessage) -> Result<(), CollaboratorError> {
        tracing::info!("📲 Push to {}: {} - {}", account_id, message.title, message.body);
        Ok(())
    }
}

/// Relays pushes to an HTTP endpoint as JSON.
#[derive(Debug, Clone)]
pub struct WebhookPushTransport {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushEnvelope<'a> {
    account_id: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a Value,
}

impl WebhookPushTransport {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl PushTransport for WebhookPushTransport {
    async fn send(&self, account_id: &str, message: &PushMessage) -> Result<(), CollaboratorError> {
        let envelope = PushEnvelope {
            account_id,
            title: &message.title,
            body: &message.body,
            data: &message.data,
        };

        self.client
            .post(&self.url)
            .json(&envelope)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
