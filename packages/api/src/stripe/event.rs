//! Provider webhook payloads.
//!
//! Only the fields the reconciler reads are modelled; everything else stays in the raw
//! `data.object` value, which is also what gets snapshotted into the audit trail.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";
pub const PAYMENT_INTENT_CREATED: &str = "payment_intent.created";
pub const PAYMENT_INTENT_REQUIRES_ACTION: &str = "payment_intent.requires_action";
pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_INTENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const PAYMENT_INTENT_CANCELED: &str = "payment_intent.canceled";
pub const CHECKOUT_SESSION_EXPIRED: &str = "checkout.session.expired";

/// Outer envelope of every webhook delivery
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventData {
    pub object: Value,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_received: Option<i64>,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntentObject {
    pub fn order_id(&self) -> Option<&str> {
        self.metadata
            .get("order_id")
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Gross amount charged, in minor units
    pub fn charged_minor(&self) -> i64 {
        match self.amount_received {
            Some(received) if received > 0 => received,
            _ => self.amount,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub customer: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub trial_start: Option<i64>,
    #[serde(default)]
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub canceled_at: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub customer: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<SubscriptionDetails>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubscriptionDetails {
    #[serde(default)]
    pub subscription: Option<String>,
}

impl InvoiceObject {
    /// Newer API versions moved the reference under `parent.subscription_details`.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_deref().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|p| p.subscription_details.as_ref())
                .and_then(|d| d.subscription.as_deref())
        })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSessionObject {
    pub fn order_id(&self) -> Option<&str> {
        self.metadata
            .get("order_id")
            .map(String::as_str)
            .or(self.client_reference_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// One variant per event kind the reconciler reacts to
#[derive(Clone, Debug)]
pub enum ProviderEvent {
    SubscriptionCreated(SubscriptionObject),
    SubscriptionUpdated(SubscriptionObject),
    SubscriptionDeleted(SubscriptionObject),
    InvoicePaymentSucceeded(InvoiceObject),
    InvoicePaymentFailed(InvoiceObject),
    PaymentIntentActionRequired(PaymentIntentObject),
    PaymentIntentSucceeded(PaymentIntentObject),
    PaymentIntentFailed(PaymentIntentObject),
    PaymentIntentCanceled(PaymentIntentObject),
    CheckoutSessionExpired(CheckoutSessionObject),
    Unhandled(String),
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn classify(&self) -> Result<ProviderEvent, serde_json::Error> {
        let object = || self.data.object.clone();

        Ok(match self.type_.as_str() {
            SUBSCRIPTION_CREATED => ProviderEvent::SubscriptionCreated(serde_json::from_value(object())?),
            SUBSCRIPTION_UPDATED => ProviderEvent::SubscriptionUpdated(serde_json::from_value(object())?),
            SUBSCRIPTION_DELETED => ProviderEvent::SubscriptionDeleted(serde_json::from_value(object())?),
            INVOICE_PAYMENT_SUCCEEDED => {
                ProviderEvent::InvoicePaymentSucceeded(serde_json::from_value(object())?)
            }
            INVOICE_PAYMENT_FAILED => ProviderEvent::InvoicePaymentFailed(serde_json::from_value(object())?),
            PAYMENT_INTENT_CREATED | PAYMENT_INTENT_REQUIRES_ACTION => {
                ProviderEvent::PaymentIntentActionRequired(serde_json::from_value(object())?)
            }
            PAYMENT_INTENT_SUCCEEDED => {
                ProviderEvent::PaymentIntentSucceeded(serde_json::from_value(object())?)
            }
            PAYMENT_INTENT_PAYMENT_FAILED => {
                ProviderEvent::PaymentIntentFailed(serde_json::from_value(object())?)
            }
            PAYMENT_INTENT_CANCELED => ProviderEvent::PaymentIntentCanceled(serde_json::from_value(object())?),
            CHECKOUT_SESSION_EXPIRED => {
                ProviderEvent::CheckoutSessionExpired(serde_json::from_value(object())?)
            }
            other => ProviderEvent::Unhandled(other.to_string()),
        })
    }
}

/// Provider timestamps are unix seconds
pub fn unix_to_naive(ts: Option<i64>) -> Option<NaiveDateTime> {
    ts.and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|dt| dt.naive_utc())
}
