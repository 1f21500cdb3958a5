//! Stripe event reconciliation.
//!
//! [`Reconciler::handle`] takes one raw webhook delivery through authentication, replay
//! detection and dispatch. Each [`ProviderEvent`] variant has its own handler module:
//!
//! - `subscription`: lifecycle rows and the audit trail
//! - `invoice`: renewals and dunning
//! - `payment`: one-time payment intents (settlement, cancellation, deferred instructions)
//! - `checkout`: abandoned sessions
//!
//! Store failures in the primary write propagate and make the provider retry. Emails and
//! outbound webhooks are best-effort and only logged.

mod checkout;
mod invoice;
mod payment;
pub mod pricing;
mod subscription;

use serde::Serialize;
use std::future::Future;

use crate::{
    notify::{DynWebhookFanout, Notifier},
    store::{DynPaymentStore, StoreError},
    stripe::{
        DynPaymentProvider, ProviderEvent, SignatureError, WebhookEvent,
        event::{PAYMENT_INTENT_SUCCEEDED, PaymentIntentObject},
        signature,
    },
};
use pricing::ExchangeRates;

pub const EVENTS_METRIC: &str = "stripe_webhook_events_total";
pub const BYPASS_METRIC: &str = "stripe_webhook_signature_bypass_total";
pub const SIDE_EFFECT_FAILURES_METRIC: &str = "stripe_webhook_side_effect_failures_total";

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("No stripe-signature header found")]
    MissingSignature,
    #[error("Webhook signature verification failed: {0}")]
    InvalidSignature(SignatureError),
    #[error("Unverified event rejected: {0}")]
    UnverifiedEvent(String),
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Payment provider error: {0}")]
    Provider(String),
}

/// Body returned to the provider on success
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
}

impl WebhookAck {
    fn processed() -> Self {
        Self {
            received: true,
            duplicate: None,
        }
    }

    fn duplicate() -> Self {
        Self {
            received: true,
            duplicate: Some(true),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReconcilerSettings {
    pub webhook_secret: Option<String>,
    /// Accept a `payment_intent.succeeded` whose signature fails, once the provider confirms it
    pub allow_unverified_succeeded: bool,
    pub frontend_url: String,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            allow_unverified_succeeded: true,
            frontend_url: crate::config::DEFAULT_FRONTEND_URL.to_string(),
        }
    }
}

pub struct Reconciler {
    store: DynPaymentStore,
    provider: Option<DynPaymentProvider>,
    notifier: Notifier,
    fanout: DynWebhookFanout,
    rates: ExchangeRates,
    settings: ReconcilerSettings,
}

impl Reconciler {
    pub fn new(
        store: DynPaymentStore,
        provider: Option<DynPaymentProvider>,
        notifier: Notifier,
        fanout: DynWebhookFanout,
        rates: ExchangeRates,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            store,
            provider,
            notifier,
            fanout,
            rates,
            settings,
        }
    }

    pub fn rates(&self) -> &ExchangeRates {
        &self.rates
    }

    fn provider(&self) -> Result<&DynPaymentProvider, ReconcileError> {
        self.provider
            .as_ref()
            .ok_or_else(|| ReconcileError::Configuration("STRIPE_SECRET_KEY is not configured".into()))
    }

    /// Process one delivery. `payload` must be the untouched request body.
    pub async fn handle(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookAck, ReconcileError> {
        let secret = self.settings.webhook_secret.as_deref().ok_or_else(|| {
            ReconcileError::Configuration("STRIPE_WEBHOOK_SECRET is not configured".into())
        })?;
        self.provider()?;

        let header = signature_header.ok_or(ReconcileError::MissingSignature)?;
        let raw = std::str::from_utf8(payload)
            .map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?;

        let event = match signature::verify(raw, header, secret) {
            Ok(()) => WebhookEvent::parse(payload)
                .map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?,
            Err(cause @ SignatureError::Mismatch) => self.accept_unverified(payload, cause).await?,
            Err(cause) => {
                tracing::warn!(error = %cause, "Rejecting webhook with invalid signature");
                return Err(ReconcileError::InvalidSignature(cause));
            }
        };

        if !self.store.claim_event(&event.id, &event.type_).await? {
            tracing::info!(event_id = %event.id, event_type = %event.type_, "Duplicate delivery, skipping");
            metrics::counter!(EVENTS_METRIC, "type" => event.type_.clone(), "outcome" => "duplicate")
                .increment(1);
            return Ok(WebhookAck::duplicate());
        }

        match self.dispatch(&event).await {
            Ok(()) => {
                metrics::counter!(EVENTS_METRIC, "type" => event.type_.clone(), "outcome" => "processed")
                    .increment(1);
                Ok(WebhookAck::processed())
            }
            Err(err) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.type_,
                    error = %err,
                    "Failed to reconcile event"
                );
                if let Err(release_err) = self.store.release_event(&event.id).await {
                    tracing::error!(
                        event_id = %event.id,
                        error = %release_err,
                        "Failed to release event claim"
                    );
                }
                metrics::counter!(EVENTS_METRIC, "type" => event.type_.clone(), "outcome" => "failed")
                    .increment(1);
                Err(err)
            }
        }
    }

    /// Signature failed. Only a provider-confirmed `payment_intent.succeeded` gets through.
    async fn accept_unverified(
        &self,
        payload: &[u8],
        cause: SignatureError,
    ) -> Result<WebhookEvent, ReconcileError> {
        let event = match WebhookEvent::parse(payload) {
            Ok(event) if event.type_ == PAYMENT_INTENT_SUCCEEDED => event,
            _ => {
                tracing::warn!(error = %cause, "Rejecting webhook with invalid signature");
                return Err(ReconcileError::InvalidSignature(cause));
            }
        };

        let reject = |reason: String| {
            tracing::warn!(
                event_id = %event.id,
                signature_error = %cause,
                reason = %reason,
                "Unverified payment_intent.succeeded rejected"
            );
            metrics::counter!(BYPASS_METRIC, "outcome" => "rejected").increment(1);
            ReconcileError::UnverifiedEvent(reason)
        };

        if !self.settings.allow_unverified_succeeded {
            return Err(reject("unverified processing is disabled".into()));
        }

        let intent: PaymentIntentObject = serde_json::from_value(event.data.object.clone())
            .map_err(|e| reject(format!("unreadable payment intent: {}", e)))?;

        let snapshot = self
            .provider()?
            .payment_intent(&intent.id)
            .await
            .map_err(|e| reject(format!("provider lookup failed: {}", e)))?;

        if snapshot.status != "succeeded" {
            return Err(reject(format!(
                "provider reports status {} for {}",
                snapshot.status, intent.id
            )));
        }
        if snapshot.amount != intent.amount
            || !snapshot.currency.eq_ignore_ascii_case(&intent.currency)
        {
            return Err(reject(format!(
                "provider reports {} {} for {}, event claims {} {}",
                snapshot.amount, snapshot.currency, intent.id, intent.amount, intent.currency
            )));
        }

        tracing::warn!(
            event_id = %event.id,
            payment_intent = %intent.id,
            signature_error = %cause,
            "Processing unverified payment_intent.succeeded confirmed by provider"
        );
        metrics::counter!(BYPASS_METRIC, "outcome" => "accepted").increment(1);
        Ok(event)
    }

    async fn dispatch(&self, event: &WebhookEvent) -> Result<(), ReconcileError> {
        let classified = event
            .classify()
            .map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?;

        match classified {
            ProviderEvent::SubscriptionCreated(sub) => subscription::created(self, event, sub).await,
            ProviderEvent::SubscriptionUpdated(sub) => subscription::updated(self, event, sub).await,
            ProviderEvent::SubscriptionDeleted(sub) => subscription::deleted(self, event, sub).await,
            ProviderEvent::InvoicePaymentSucceeded(invoice) => {
                invoice::payment_succeeded(self, event, invoice).await
            }
            ProviderEvent::InvoicePaymentFailed(invoice) => {
                invoice::payment_failed(self, event, invoice).await
            }
            ProviderEvent::PaymentIntentActionRequired(intent) => {
                payment::action_required(self, intent).await
            }
            ProviderEvent::PaymentIntentSucceeded(intent) => payment::succeeded(self, intent).await,
            ProviderEvent::PaymentIntentFailed(intent) => payment::failed(self, intent).await,
            ProviderEvent::PaymentIntentCanceled(intent) => payment::canceled(self, intent).await,
            ProviderEvent::CheckoutSessionExpired(session) => checkout::expired(self, session).await,
            ProviderEvent::Unhandled(event_type) => {
                tracing::info!(event_type = %event_type, "Unhandled event type");
                Ok(())
            }
        }
    }

    /// Run a side effect whose failure must not fail the delivery.
    async fn best_effort<F>(&self, step: &'static str, effect: F)
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        if let Err(err) = effect.await {
            tracing::warn!(step, error = %err, "Side effect failed");
            metrics::counter!(SIDE_EFFECT_FAILURES_METRIC, "step" => step).increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::{MemoryPaymentStore, PaymentStore},
        stripe::PaymentIntentSnapshot,
        test_support::{Harness, WEBHOOK_SECRET, event_payload, pending_order, product, sign_now},
    };
    use serde_json::json;
    use std::sync::Arc;

    fn succeeded_payload(event_id: &str) -> Vec<u8> {
        event_payload(
            event_id,
            PAYMENT_INTENT_SUCCEEDED,
            json!({
                "id": "pi_1",
                "amount": 500000,
                "currency": "kz",
                "status": "succeeded",
                "metadata": { "order_id": "O1", "has_custom_prices": "false" }
            }),
        )
    }

    fn seeded() -> Harness {
        let harness = Harness::new();
        harness.store.insert_product(product("P1", "5,000 KZ", None));
        harness.store.insert_order(pending_order("O1", "P1"));
        harness
    }

    fn tampered_header(payload: &[u8]) -> String {
        crate::test_support::sign(payload, "whsec_wrong", chrono::Utc::now().timestamp())
    }

    #[tokio::test]
    async fn test_missing_secret_is_configuration_error() {
        let harness = Harness::with_settings(ReconcilerSettings::default());
        let payload = succeeded_payload("evt_1");
        let err = harness
            .reconciler
            .handle(&payload, Some(&sign_now(&payload)))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(_)));
        assert_eq!(harness.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_provider_is_configuration_error() {
        let reconciler = Reconciler::new(
            Arc::new(MemoryPaymentStore::default()),
            None,
            Notifier::new(None),
            Arc::new(crate::notify::DisabledWebhookFanout),
            ExchangeRates::default(),
            ReconcilerSettings {
                webhook_secret: Some(WEBHOOK_SECRET.into()),
                ..ReconcilerSettings::default()
            },
        );
        let payload = succeeded_payload("evt_1");
        let err = reconciler
            .handle(&payload, Some(&sign_now(&payload)))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(msg) if msg.contains("STRIPE_SECRET_KEY")));
    }

    #[tokio::test]
    async fn test_missing_signature_header() {
        let harness = seeded();
        let err = harness
            .reconciler
            .handle(&succeeded_payload("evt_1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::MissingSignature));
    }

    #[tokio::test]
    async fn test_invalid_signature_rejected_without_writes() {
        let harness = seeded();
        let payload = event_payload(
            "evt_1",
            "payment_intent.payment_failed",
            json!({ "id": "pi_1", "metadata": { "order_id": "O1" } }),
        );
        let writes_before = harness.store.write_count();

        let err = harness
            .reconciler
            .handle(&payload, Some(&tampered_header(&payload)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::InvalidSignature(SignatureError::Mismatch)
        ));
        assert_eq!(harness.store.write_count(), writes_before);
        assert_eq!(harness.store.order("O1").unwrap().status, crate::store::OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_stale_signature_never_enters_fallback() {
        let harness = seeded();
        harness.provider.insert(PaymentIntentSnapshot {
            id: "pi_1".into(),
            status: "succeeded".into(),
            amount: 500000,
            currency: "KZ".into(),
            deferred: None,
        });
        let payload = succeeded_payload("evt_1");
        let header = crate::test_support::sign(
            &payload,
            WEBHOOK_SECRET,
            chrono::Utc::now().timestamp() - 3_600,
        );

        let err = harness.reconciler.handle(&payload, Some(&header)).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::InvalidSignature(SignatureError::Stale(_))
        ));
        assert_eq!(harness.store.order("O1").unwrap().status, crate::store::OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_unverified_succeeded_requires_provider_confirmation() {
        let harness = seeded();
        let payload = succeeded_payload("evt_1");

        // unknown to the provider
        let err = harness
            .reconciler
            .handle(&payload, Some(&tampered_header(&payload)))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnverifiedEvent(_)));
        assert_eq!(harness.store.order("O1").unwrap().status, crate::store::OrderStatus::Pending);

        // provider disagrees on amount
        harness.provider.insert(PaymentIntentSnapshot {
            id: "pi_1".into(),
            status: "succeeded".into(),
            amount: 100,
            currency: "KZ".into(),
            deferred: None,
        });
        let err = harness
            .reconciler
            .handle(&payload, Some(&tampered_header(&payload)))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnverifiedEvent(_)));
    }

    #[tokio::test]
    async fn test_unverified_succeeded_accepted_when_confirmed() {
        let harness = seeded();
        harness.provider.insert(PaymentIntentSnapshot {
            id: "pi_1".into(),
            status: "succeeded".into(),
            amount: 500000,
            currency: "KZ".into(),
            deferred: None,
        });
        let payload = succeeded_payload("evt_1");

        let ack = harness
            .reconciler
            .handle(&payload, Some(&tampered_header(&payload)))
            .await
            .unwrap();
        assert_eq!(ack, WebhookAck::processed());
        assert_eq!(
            harness.store.order("O1").unwrap().status,
            crate::store::OrderStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_unverified_succeeded_disabled() {
        let harness = Harness::with_settings(ReconcilerSettings {
            webhook_secret: Some(WEBHOOK_SECRET.into()),
            allow_unverified_succeeded: false,
            ..ReconcilerSettings::default()
        });
        harness.provider.insert(PaymentIntentSnapshot {
            id: "pi_1".into(),
            status: "succeeded".into(),
            amount: 500000,
            currency: "KZ".into(),
            deferred: None,
        });
        let payload = succeeded_payload("evt_1");
        let err = harness
            .reconciler
            .handle(&payload, Some(&tampered_header(&payload)))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnverifiedEvent(msg) if msg.contains("disabled")));
    }

    #[tokio::test]
    async fn test_replay_is_acknowledged_without_side_effects() {
        let harness = seeded();
        let payload = succeeded_payload("evt_1");

        let first = harness.deliver(&payload).await.unwrap();
        assert_eq!(first.duplicate, None);
        let after_first = harness.store.order("O1").unwrap();
        let emails = harness.mail.sent().len();
        let deliveries = harness.fanout.deliveries().len();

        let second = harness.deliver(&payload).await.unwrap();
        assert_eq!(second.duplicate, Some(true));

        assert_eq!(harness.store.order("O1").unwrap(), after_first);
        assert_eq!(harness.store.product_snapshot("P1").unwrap().sales, 1);
        assert_eq!(harness.mail.sent().len(), emails);
        assert_eq!(harness.fanout.deliveries().len(), deliveries);
    }

    #[tokio::test]
    async fn test_in_flight_event_is_not_dispatched_twice() {
        let harness = seeded();
        // another delivery of evt_1 holds the claim
        assert!(harness.store.claim_event("evt_1", PAYMENT_INTENT_SUCCEEDED).await.unwrap());

        let ack = harness.deliver(&succeeded_payload("evt_1")).await.unwrap();
        assert_eq!(ack, WebhookAck::duplicate());
        assert_eq!(harness.store.order("O1").unwrap().status, crate::store::OrderStatus::Pending);
        assert_eq!(harness.store.product_snapshot("P1").unwrap().sales, 0);
        assert!(harness.mail.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unhandled_event_is_acknowledged() {
        let harness = seeded();
        let payload = event_payload("evt_9", "charge.refunded", json!({ "id": "ch_1" }));
        let ack = harness.deliver(&payload).await.unwrap();
        assert!(ack.received);
        assert_eq!(harness.store.order("O1").unwrap().status, crate::store::OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let harness = seeded();
        let err = harness.deliver(b"{not json").await.unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_not_marked_processed() {
        let harness = seeded();
        let payload = event_payload(
            "evt_sub",
            crate::stripe::event::SUBSCRIPTION_UPDATED,
            json!({ "id": "sub_missing", "customer": "cus_1", "status": "active" }),
        );
        assert!(matches!(
            harness.deliver(&payload).await,
            Err(ReconcileError::NotFound(_))
        ));
        assert!(!harness.store.has_event("evt_sub"));
        // a retry is processed again rather than treated as a duplicate
        assert!(matches!(
            harness.deliver(&payload).await,
            Err(ReconcileError::NotFound(_))
        ));
    }
}
