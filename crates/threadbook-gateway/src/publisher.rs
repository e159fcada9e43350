use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

/// Outbound half of the pub/sub transport. Channel names are opaque here.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, data: Bytes) -> Result<()>;
}

/// Publishes through the Centrifugo server HTTP API.
pub struct CentrifugoPublisher {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ApiReply {
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    code: u32,
    message: String,
}

impl CentrifugoPublisher {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build centrifugo http client")?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Publisher for CentrifugoPublisher {
    async fn publish(&self, channel: &str, data: Bytes) -> Result<()> {
        let event: serde_json::Value = serde_json::from_slice(&data).context("event payload is not json")?;
        let body = serde_json::json!({ "channel": channel, "data": event });

        let resp = self
            .http
            .post(format!("{}/publish", self.api_url))
            .header("X-API-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("centrifugo publish to {}", channel))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("centrifugo publish to {} failed with HTTP {}", channel, status);
        }

        let reply: ApiReply = resp.json().await.context("decode centrifugo reply")?;
        if let Some(err) = reply.error {
            bail!("centrifugo publish to {} failed: {} (code {})", channel, err.message, err.code);
        }

        debug!(channel, "published to centrifugo");
        Ok(())
    }
}
