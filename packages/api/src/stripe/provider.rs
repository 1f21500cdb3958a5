//! Read access to the payment provider's API.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Display data for reference-style payment methods (Multibanco)
#[derive(Clone, Debug, PartialEq)]
pub struct DeferredPaymentDetails {
    pub entity: String,
    pub reference: String,
    /// Major units
    pub amount: f64,
    pub currency: String,
    pub expires_at: Option<i64>,
    pub voucher_url: Option<String>,
}

/// What the provider currently reports for a payment intent
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentIntentSnapshot {
    pub id: String,
    pub status: String,
    /// Minor units
    pub amount: i64,
    pub currency: String,
    pub deferred: Option<DeferredPaymentDetails>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn payment_intent(&self, id: &str) -> anyhow::Result<PaymentIntentSnapshot>;
}

pub type DynPaymentProvider = Arc<dyn PaymentProvider>;

#[derive(Deserialize)]
struct RawPaymentIntent {
    id: String,
    status: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    next_action: Option<RawNextAction>,
}

#[derive(Deserialize)]
struct RawNextAction {
    #[serde(default)]
    multibanco_display_details: Option<RawMultibancoDetails>,
}

#[derive(Deserialize)]
struct RawMultibancoDetails {
    #[serde(default)]
    entity: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    hosted_voucher_url: Option<String>,
}

impl From<RawPaymentIntent> for PaymentIntentSnapshot {
    fn from(raw: RawPaymentIntent) -> Self {
        let currency = raw.currency.to_uppercase();
        let deferred = raw
            .next_action
            .and_then(|a| a.multibanco_display_details)
            .and_then(|d| match (d.entity, d.reference) {
                (Some(entity), Some(reference)) => Some(DeferredPaymentDetails {
                    entity,
                    reference,
                    amount: raw.amount as f64 / 100.0,
                    currency: currency.clone(),
                    expires_at: d.expires_at,
                    voucher_url: d.hosted_voucher_url,
                }),
                _ => None,
            });

        Self {
            id: raw.id,
            status: raw.status,
            amount: raw.amount,
            currency,
            deferred,
        }
    }
}

pub struct StripePaymentProvider {
    client: stripe::Client,
}

impl StripePaymentProvider {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripePaymentProvider {
    async fn payment_intent(&self, id: &str) -> anyhow::Result<PaymentIntentSnapshot> {
        let raw: RawPaymentIntent = self
            .client
            .get(&format!("/payment_intents/{}", id))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to retrieve payment intent {}: {}", id, e))?;

        Ok(raw.into())
    }
}
