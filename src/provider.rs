//! Outbound client for the external push provider.
//!
//! One campaign becomes exactly one POST carrying the full recipient batch.
//! There is no retry or backoff: a failed call fails the campaign and the
//! admin re-triggers manually.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::campaign::{Campaign, CampaignKind};

/// Notification fields forwarded to the provider for every recipient.
#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub message: String,
    pub kind: CampaignKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,
}

impl PushPayload {
    pub fn from_campaign(c: &Campaign) -> Self {
        Self {
            title: c.title.clone(),
            message: c.message.clone(),
            kind: c.kind,
            image_url: c.image_url.clone(),
            deep_link: c.deep_link.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PushBatch<'a> {
    campaign_id: Uuid,
    recipients: &'a [String],
    notification: &'a PushPayload,
}

/// Delivery receipt returned by the provider. Both fields are optional:
/// a missing `delivered` count means every submitted token was accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushReceipt {
    pub delivered: Option<u64>,
    pub failed_tokens: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct PushClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PushClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("Pushgate/1.0")
                .build()
                .expect("failed to build push HTTP client"),
            base_url,
            api_key,
        }
    }

    /// Submit one campaign batch. Non-2xx responses and transport errors are
    /// returned as errors; the caller owns the FAILED transition.
    pub async fn send_batch(
        &self,
        campaign_id: Uuid,
        tokens: &[String],
        payload: &PushPayload,
    ) -> anyhow::Result<PushReceipt> {
        let batch = PushBatch {
            campaign_id,
            recipients: tokens,
            notification: payload,
        };

        let resp = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .json(&batch)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("push provider returned error: status={}, body={}", status, body);
        }

        let receipt: PushReceipt = resp.json().await?;
        tracing::debug!(
            %campaign_id,
            submitted = tokens.len(),
            delivered = ?receipt.delivered,
            "push provider accepted batch"
        );

        Ok(receipt)
    }
}
