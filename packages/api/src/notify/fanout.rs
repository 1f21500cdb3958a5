//! Outbound seller webhooks.
//!
//! The reconciler hands each delivery to a relay that knows the seller's registered
//! endpoints. Delivery is fire-and-forget from the reconciler's point of view.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OutboundEvent {
    #[serde(rename = "payment.success")]
    PaymentSuccess,
    #[serde(rename = "product.purchased")]
    ProductPurchased,
}

impl OutboundEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentSuccess => "payment.success",
            Self::ProductPurchased => "product.purchased",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WebhookDelivery {
    pub event: OutboundEvent,
    pub data: Value,
    pub user_id: Option<String>,
    pub order_id: String,
    pub product_id: Option<String>,
}

#[async_trait]
pub trait WebhookFanout: Send + Sync {
    async fn dispatch(&self, delivery: WebhookDelivery) -> Result<()>;
}

pub type DynWebhookFanout = Arc<dyn WebhookFanout>;

/// Posts deliveries to the platform's webhook relay endpoint.
pub struct HttpWebhookFanout {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpWebhookFanout {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to build webhook client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }
}

#[async_trait]
impl WebhookFanout for HttpWebhookFanout {
    async fn dispatch(&self, delivery: WebhookDelivery) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(&delivery);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("Failed to deliver {}: {}", delivery.event.as_str(), e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Webhook relay rejected {}: {} - {}",
                delivery.event.as_str(),
                status,
                body
            ));
        }

        tracing::debug!(
            event = delivery.event.as_str(),
            order_id = %delivery.order_id,
            "Outbound webhook relayed"
        );
        Ok(())
    }
}

/// Used when no relay endpoint is configured.
pub struct DisabledWebhookFanout;

#[async_trait]
impl WebhookFanout for DisabledWebhookFanout {
    async fn dispatch(&self, delivery: WebhookDelivery) -> Result<()> {
        tracing::debug!(
            event = delivery.event.as_str(),
            order_id = %delivery.order_id,
            "Webhook fan-out disabled, dropping delivery"
        );
        Ok(())
    }
}
