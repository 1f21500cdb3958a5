//! One-time payment intents.

use anyhow::{Context, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    ReconcileError, Reconciler,
    pricing::{PricingFlow, SETTLEMENT_CURRENCY, minor_to_major, parse_list_price, settle_order},
};
use crate::{
    notify::{
        AccessGrant, OutboundEvent, PaymentInstructions, PurchaseConfirmation, WebhookDelivery,
        generate_temporary_password, hash_credential,
    },
    store::{CancellationReason, NewMemberAccess, OrderRecord, OrderSettlement, ProductRecord},
    stripe::event::PaymentIntentObject,
};

const DEFERRED_METHOD: &str = "multibanco";

/// Secondary product attached at checkout. Field names vary between checkout versions.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(super) struct OrderBump {
    #[serde(default, alias = "bump_product_id", alias = "productId")]
    pub product_id: Option<String>,
    #[serde(default, alias = "bump_product_name", alias = "name")]
    pub product_name: Option<String>,
    #[serde(default, alias = "bump_product_price")]
    pub price: Option<Value>,
    #[serde(default)]
    pub discounted_price: Option<Value>,
}

impl OrderBump {
    /// Discounted price when present, else the list price
    pub fn amount(&self) -> Option<f64> {
        self.discounted_price
            .as_ref()
            .and_then(amount_from_value)
            .or_else(|| self.price.as_ref().and_then(amount_from_value))
    }
}

fn amount_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_list_price(s),
        _ => None,
    }
}

/// Accepts a list of bumps or a single bump object; anything else yields nothing.
pub(super) fn parse_order_bumps(value: &Value) -> Vec<OrderBump> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        Value::Object(_) => serde_json::from_value(value.clone())
            .map(|bump| vec![bump])
            .unwrap_or_default(),
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .map(|inner| match inner {
                Value::String(_) => Vec::new(),
                other => parse_order_bumps(&other),
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub(super) async fn succeeded(
    ctx: &Reconciler,
    intent: PaymentIntentObject,
) -> Result<(), ReconcileError> {
    let Some(order_id) = intent.order_id() else {
        tracing::info!(payment_intent = %intent.id, "Succeeded intent without order_id, skipping");
        return Ok(());
    };

    let order = ctx
        .store
        .find_order(order_id)
        .await?
        .ok_or_else(|| ReconcileError::NotFound(format!("Order {}", order_id)))?;

    let product_id = intent
        .metadata
        .get("product_id")
        .cloned()
        .or_else(|| order.product_id.clone());
    let product = match &product_id {
        Some(id) => ctx.store.product(id).await?,
        None => None,
    };

    let has_custom_prices = intent
        .metadata
        .get("has_custom_prices")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let flow = if has_custom_prices {
        PricingFlow::Custom
    } else {
        PricingFlow::ConvertedDefault {
            list_price: product.as_ref().and_then(|p| parse_list_price(&p.price)),
        }
    };

    let charged = intent.charged_minor();
    let settlement = settle_order(ctx.rates(), charged, &intent.currency, flow);

    let completed = ctx
        .store
        .complete_order(
            order_id,
            &OrderSettlement {
                amount: settlement.amount_in_settlement.to_string(),
                currency: SETTLEMENT_CURRENCY.to_string(),
                seller_commission: settlement.seller_commission,
            },
        )
        .await?
        .ok_or_else(|| ReconcileError::NotFound(format!("Order {}", order_id)))?;

    tracing::info!(
        order_id = %order_id,
        payment_intent = %intent.id,
        paid_amount = minor_to_major(charged),
        paid_currency = %intent.currency,
        amount_in_kz = settlement.amount_in_settlement,
        seller_commission = settlement.seller_commission,
        rate = settlement.rate,
        rates_version = %ctx.rates().version,
        custom_prices = has_custom_prices,
        first_completion = completed.first_completion,
        "Order completed"
    );

    if !completed.first_completion {
        tracing::info!(order_id = %order_id, "Order was already completed, skipping notifications");
        return Ok(());
    }
    let completed = completed.order;

    let display_amount = intent
        .metadata
        .get("original_amount")
        .and_then(|a| a.parse::<f64>().ok())
        .unwrap_or_else(|| minor_to_major(charged));
    let display_currency = intent
        .metadata
        .get("original_currency")
        .cloned()
        .unwrap_or_else(|| intent.currency.to_uppercase());

    let bumps = intent
        .metadata
        .get("order_bump_data")
        .map(|raw| parse_order_bumps(&Value::String(raw.clone())))
        .filter(|bumps| !bumps.is_empty())
        .or_else(|| completed.order_bump_data.as_ref().map(parse_order_bumps))
        .unwrap_or_default();

    let sale = Sale {
        intent: &intent,
        order: &completed,
        product: product.as_ref(),
        display_amount,
        display_currency: &display_currency,
    };

    ctx.best_effort("purchase_confirmation", sale.send_confirmation(ctx))
        .await;

    if let Some(product) = &product {
        ctx.best_effort("access_email", sale.grant_access(ctx, product))
            .await;
    }

    for bump in &bumps {
        let Some(bump_product_id) = &bump.product_id else {
            continue;
        };
        ctx.best_effort("bump_access_email", sale.grant_bump_access(ctx, bump_product_id))
            .await;
    }

    let user_id = completed
        .user_id
        .clone()
        .or_else(|| product.as_ref().map(|p| p.user_id.clone()));
    let product_name = product.as_ref().map(|p| p.name.clone());

    sale.fan_out(
        ctx,
        order_id.to_string(),
        user_id.clone(),
        product_id.clone(),
        product_name,
        display_amount,
    )
    .await;

    for bump in &bumps {
        let Some(bump_product_id) = &bump.product_id else {
            continue;
        };
        sale.fan_out(
            ctx,
            format!("{}-BUMP-{}", order_id, bump_product_id),
            user_id.clone(),
            Some(bump_product_id.clone()),
            bump.product_name.clone(),
            bump.amount().unwrap_or(0.0),
        )
        .await;
    }

    Ok(())
}

/// Read-only context for the side effects of a completed order
struct Sale<'a> {
    intent: &'a PaymentIntentObject,
    order: &'a OrderRecord,
    product: Option<&'a ProductRecord>,
    display_amount: f64,
    display_currency: &'a str,
}

impl Sale<'_> {
    async fn seller_identity(&self, ctx: &Reconciler, user_id: &str) -> (Option<String>, Option<String>) {
        match ctx.store.seller_profile(user_id).await {
            Ok(Some(profile)) => (profile.email, profile.full_name),
            Ok(None) => (None, None),
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "Failed to load seller profile");
                (None, None)
            }
        }
    }

    async fn send_confirmation(&self, ctx: &Reconciler) -> anyhow::Result<()> {
        let (seller_email, seller_name) = match self.product {
            Some(product) => self.seller_identity(ctx, &product.user_id).await,
            None => (None, None),
        };

        ctx.notifier
            .purchase_confirmation(&PurchaseConfirmation {
                order_id: self.order.order_id.clone(),
                customer_email: self.order.customer_email.clone(),
                customer_name: self.order.customer_name.clone(),
                product_name: self
                    .product
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| "Produto".to_string()),
                amount: self.display_amount,
                currency: self.display_currency.to_string(),
                seller_email,
                seller_name,
            })
            .await
    }

    /// Access email for `product` when it unlocks a member area. Products without one are a no-op.
    async fn grant_access(&self, ctx: &Reconciler, product: &ProductRecord) -> anyhow::Result<()> {
        let Some(area_id) = &product.member_area_id else {
            return Ok(());
        };
        let area = ctx
            .store
            .member_area(area_id)
            .await?
            .with_context(|| format!("Member area {} not found", area_id))?;

        let temporary_password = generate_temporary_password();
        let granted = ctx
            .store
            .grant_member_access(NewMemberAccess {
                member_area_id: area.id.clone(),
                student_email: self.order.customer_email.clone(),
                student_name: self.order.customer_name.clone(),
                credential_hash: hash_credential(&temporary_password),
            })
            .await?;
        if !granted {
            tracing::info!(area_id = %area.id, "Student already has access, no new credential issued");
            return Ok(());
        }

        let (_, seller_name) = self.seller_identity(ctx, &product.user_id).await;
        let area_url = if area.url.is_empty() {
            format!("{}/members/area/{}", ctx.settings.frontend_url, area.id)
        } else {
            area.url.clone()
        };

        ctx.notifier
            .access_granted(&AccessGrant {
                student_email: self.order.customer_email.clone(),
                student_name: self.order.customer_name.clone(),
                area_name: area.name.clone(),
                area_url,
                seller_name: seller_name.unwrap_or_else(|| "Kambafy".to_string()),
                temporary_password,
            })
            .await?;

        tracing::info!(area_id = %area.id, product_id = %product.id, "Member area access sent");
        Ok(())
    }

    async fn grant_bump_access(&self, ctx: &Reconciler, product_id: &str) -> anyhow::Result<()> {
        let product = ctx
            .store
            .product(product_id)
            .await?
            .ok_or_else(|| anyhow!("Bump product {} not found", product_id))?;
        self.grant_access(ctx, &product).await
    }

    /// `payment.success` then `product.purchased`, each best-effort
    async fn fan_out(
        &self,
        ctx: &Reconciler,
        order_id: String,
        user_id: Option<String>,
        product_id: Option<String>,
        product_name: Option<String>,
        amount: f64,
    ) {
        let data = json!({
            "order_id": order_id,
            "payment_intent_id": self.intent.id,
            "amount": amount,
            "currency": self.display_currency,
            "customer_email": self.order.customer_email,
            "customer_name": self.order.customer_name,
            "product_id": product_id,
            "product_name": product_name,
        });

        for event in [OutboundEvent::PaymentSuccess, OutboundEvent::ProductPurchased] {
            let delivery = WebhookDelivery {
                event,
                data: data.clone(),
                user_id: user_id.clone(),
                order_id: order_id.clone(),
                product_id: product_id.clone(),
            };
            ctx.best_effort("webhook_fanout", ctx.fanout.dispatch(delivery))
                .await;
        }
    }
}

async fn cancel(
    ctx: &Reconciler,
    intent: &PaymentIntentObject,
    reason: CancellationReason,
) -> Result<(), ReconcileError> {
    let Some(order_id) = intent.order_id() else {
        tracing::info!(payment_intent = %intent.id, "Intent without order_id, nothing to cancel");
        return Ok(());
    };

    let rows = ctx.store.cancel_order(order_id, reason).await?;
    if rows == 0 {
        tracing::info!(order_id = %order_id, reason = reason.as_str(), "No cancellable order matched");
    } else {
        tracing::info!(order_id = %order_id, reason = reason.as_str(), "Order cancelled");
    }
    Ok(())
}

pub(super) async fn failed(
    ctx: &Reconciler,
    intent: PaymentIntentObject,
) -> Result<(), ReconcileError> {
    cancel(ctx, &intent, CancellationReason::PaymentFailed).await
}

pub(super) async fn canceled(
    ctx: &Reconciler,
    intent: PaymentIntentObject,
) -> Result<(), ReconcileError> {
    cancel(ctx, &intent, CancellationReason::PaymentFailed).await
}

/// Deferred (reference) payments: email the buyer the entity and reference to pay with.
pub(super) async fn action_required(
    ctx: &Reconciler,
    intent: PaymentIntentObject,
) -> Result<(), ReconcileError> {
    let deferred = intent
        .payment_method_types
        .iter()
        .any(|m| m == DEFERRED_METHOD);
    if !deferred || intent.status != "requires_action" {
        tracing::debug!(
            payment_intent = %intent.id,
            status = %intent.status,
            "Intent needs no payment instructions"
        );
        return Ok(());
    }

    ctx.best_effort("payment_instructions", send_instructions(ctx, &intent))
        .await;
    Ok(())
}

async fn send_instructions(ctx: &Reconciler, intent: &PaymentIntentObject) -> anyhow::Result<()> {
    let order_id = intent
        .order_id()
        .ok_or_else(|| anyhow!("Intent {} has no order_id", intent.id))?;
    let order = ctx
        .store
        .find_order(order_id)
        .await?
        .with_context(|| format!("Order {} not found", order_id))?;

    let product_name = match &order.product_id {
        Some(id) => ctx.store.product(id).await?.map(|p| p.name),
        None => None,
    }
    .unwrap_or_else(|| "Produto".to_string());

    let snapshot = ctx.provider()?.payment_intent(&intent.id).await?;
    let details = snapshot
        .deferred
        .with_context(|| format!("No reference details for {}", intent.id))?;

    ctx.notifier
        .payment_instructions(&PaymentInstructions {
            customer_email: order.customer_email,
            customer_name: order.customer_name,
            product_name,
            entity: details.entity,
            reference: details.reference,
            amount: details.amount,
            currency: details.currency,
            voucher_url: details.voucher_url,
        })
        .await?;

    tracing::info!(order_id = %order_id, payment_intent = %intent.id, "Payment instructions sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        notify::OutboundEvent,
        store::OrderStatus,
        stripe::{
            DeferredPaymentDetails, PaymentIntentSnapshot,
            event::{
                PAYMENT_INTENT_CANCELED, PAYMENT_INTENT_CREATED, PAYMENT_INTENT_PAYMENT_FAILED,
                PAYMENT_INTENT_SUCCEEDED,
            },
        },
        test_support::{Harness, event_payload, member_area, pending_order, product, seller},
    };

    fn succeeded_event(event_id: &str, amount: i64, currency: &str, metadata: Value) -> Vec<u8> {
        event_payload(
            event_id,
            PAYMENT_INTENT_SUCCEEDED,
            json!({
                "id": "pi_1",
                "amount": amount,
                "currency": currency,
                "status": "succeeded",
                "metadata": metadata
            }),
        )
    }

    #[tokio::test]
    async fn test_completed_sale_base_currency() {
        let harness = Harness::new();
        harness.store.insert_product(product("P1", "5,000 KZ", None));
        harness.store.insert_order(pending_order("O1", "P1"));

        harness
            .deliver(&succeeded_event(
                "evt_1",
                500_000,
                "kz",
                json!({ "order_id": "O1", "has_custom_prices": "false" }),
            ))
            .await
            .unwrap();

        let order = harness.store.order("O1").unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.amount, "5000");
        assert_eq!(order.currency, "KZ");
        assert_eq!(order.seller_commission, Some(4550.5));
        assert_eq!(harness.store.product_snapshot("P1").unwrap().sales, 1);
    }

    #[tokio::test]
    async fn test_completed_sale_foreign_currency_custom_price() {
        let harness = Harness::new();
        harness.store.insert_product(product("P1", "5,000 KZ", None));
        harness.store.insert_order(pending_order("O1", "P1"));

        harness
            .deliver(&succeeded_event(
                "evt_1",
                5000,
                "eur",
                json!({ "order_id": "O1", "has_custom_prices": "true" }),
            ))
            .await
            .unwrap();

        let order = harness.store.order("O1").unwrap();
        assert_eq!(order.amount, "55000");
        assert_eq!(order.currency, "KZ");
        assert_eq!(order.seller_commission, Some(50_055.5));
    }

    #[tokio::test]
    async fn test_replayed_succeeded_keeps_terminal_values() {
        let harness = Harness::new();
        harness.store.insert_product(product("P1", "5,000 KZ", None));
        harness.store.insert_order(pending_order("O1", "P1"));
        let metadata = json!({ "order_id": "O1" });

        harness
            .deliver(&succeeded_event("evt_1", 500_000, "kz", metadata.clone()))
            .await
            .unwrap();
        let first = harness.store.order("O1").unwrap();
        let mails = harness.mail.sent().len();
        let deliveries = harness.fanout.deliveries().len();

        // same intent redelivered under a new event id still settles identically
        harness
            .deliver(&succeeded_event("evt_2", 500_000, "kz", metadata))
            .await
            .unwrap();
        let second = harness.store.order("O1").unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(first.amount, second.amount);
        assert_eq!(first.currency, second.currency);
        assert_eq!(first.seller_commission, second.seller_commission);
        assert_eq!(harness.store.product_snapshot("P1").unwrap().sales, 1);
        assert_eq!(harness.mail.sent().len(), mails);
        assert_eq!(harness.fanout.deliveries().len(), deliveries);
    }

    #[tokio::test]
    async fn test_repeat_purchase_keeps_existing_access() {
        let harness = Harness::new();
        harness.store.insert_product(product("P1", "5,000 KZ", Some("A1")));
        harness.store.insert_member_area(member_area("A1"));
        harness.store.insert_order(pending_order("O1", "P1"));
        harness.store.insert_order(pending_order("O2", "P1"));

        harness
            .deliver(&succeeded_event("evt_1", 500_000, "kz", json!({ "order_id": "O1" })))
            .await
            .unwrap();
        let access = harness.store.member_access("A1", "buyer@example.com").unwrap();
        assert_eq!(access.credential_hash.len(), 64);
        assert_eq!(access.student_name, "Ana Buyer");

        harness
            .deliver(&succeeded_event("evt_2", 500_000, "kz", json!({ "order_id": "O2" })))
            .await
            .unwrap();

        let access_mails = harness
            .mail
            .sent()
            .iter()
            .filter(|m| m.subject.contains("Area A1"))
            .count();
        assert_eq!(access_mails, 1);
        assert_eq!(
            harness.store.member_access("A1", "buyer@example.com").unwrap().credential_hash,
            access.credential_hash
        );
        assert_eq!(harness.store.product_snapshot("P1").unwrap().sales, 2);
    }

    #[tokio::test]
    async fn test_missing_order_id_is_skipped() {
        let harness = Harness::new();
        let ack = harness
            .deliver(&succeeded_event("evt_1", 1000, "kz", json!({})))
            .await
            .unwrap();
        assert!(ack.received);
        assert!(harness.mail.sent().is_empty());
        assert!(harness.fanout.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_order_on_success_propagates() {
        let harness = Harness::new();
        let err = harness
            .deliver(&succeeded_event("evt_1", 1000, "kz", json!({ "order_id": "O404" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_side_effects_use_original_amount_and_bumps() {
        let harness = Harness::new();
        harness.store.insert_product(product("P1", "5,000 KZ", Some("A1")));
        harness.store.insert_product(product("P2", "1,000 KZ", Some("A2")));
        harness.store.insert_member_area(member_area("A1"));
        harness.store.insert_member_area(member_area("A2"));
        harness.store.insert_profile(seller());
        harness.store.insert_order(pending_order("O1", "P1"));

        let bumps = json!([{
            "bump_product_id": "P2",
            "bump_product_name": "Bonus",
            "bump_product_price": "1,000 KZ",
            "discounted_price": 800
        }])
        .to_string();

        harness
            .deliver(&succeeded_event(
                "evt_1",
                5000,
                "eur",
                json!({
                    "order_id": "O1",
                    "has_custom_prices": "true",
                    "original_amount": "50",
                    "original_currency": "EUR",
                    "order_bump_data": bumps
                }),
            ))
            .await
            .unwrap();

        let sent = harness.mail.sent();
        let recipients: Vec<_> = sent.iter().map(|m| m.to.as_str()).collect();
        // customer receipt, seller notice, main access, bump access
        assert_eq!(
            recipients,
            vec![
                "buyer@example.com",
                "seller@example.com",
                "buyer@example.com",
                "buyer@example.com"
            ]
        );
        assert!(sent[0].body_text.as_deref().unwrap().contains("50 EUR"));
        assert!(sent[2].subject.contains("Area A1"));
        assert!(sent[3].subject.contains("Area A2"));

        let deliveries = harness.fanout.deliveries();
        assert_eq!(deliveries.len(), 4);
        assert_eq!(deliveries[0].event, OutboundEvent::PaymentSuccess);
        assert_eq!(deliveries[1].event, OutboundEvent::ProductPurchased);
        assert_eq!(deliveries[0].order_id, "O1");
        assert_eq!(deliveries[0].data["amount"], 50.0);
        assert_eq!(deliveries[0].data["currency"], "EUR");
        assert_eq!(deliveries[0].user_id.as_deref(), Some("user123"));
        assert_eq!(deliveries[2].order_id, "O1-BUMP-P2");
        assert_eq!(deliveries[2].product_id.as_deref(), Some("P2"));
        assert_eq!(deliveries[2].data["amount"], 800.0);
        assert_eq!(deliveries[3].event, OutboundEvent::ProductPurchased);
    }

    #[tokio::test]
    async fn test_missing_member_area_does_not_fail_delivery() {
        let harness = Harness::new();
        harness.store.insert_product(product("P1", "5,000 KZ", Some("A404")));
        harness.store.insert_order(pending_order("O1", "P1"));

        let ack = harness
            .deliver(&succeeded_event("evt_1", 500_000, "kz", json!({ "order_id": "O1" })))
            .await
            .unwrap();
        assert!(ack.received);
        // receipt still sent, fan-out still emitted
        assert_eq!(harness.mail.sent().len(), 1);
        assert_eq!(harness.fanout.deliveries().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_events_on_unknown_order() {
        let harness = Harness::new();
        for (i, event_type) in [PAYMENT_INTENT_PAYMENT_FAILED, PAYMENT_INTENT_CANCELED]
            .into_iter()
            .enumerate()
        {
            let ack = harness
                .deliver(&event_payload(
                    &format!("evt_{}", i),
                    event_type,
                    json!({ "id": "pi_1", "metadata": { "order_id": "DOES_NOT_EXIST" } }),
                ))
                .await
                .unwrap();
            assert!(ack.received);
        }
        assert!(harness.store.order("DOES_NOT_EXIST").is_none());
        // only the two event claims were written
        assert_eq!(harness.store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_payment_cancels_pending_order() {
        let harness = Harness::new();
        harness.store.insert_order(pending_order("O1", "P1"));
        harness
            .deliver(&event_payload(
                "evt_1",
                PAYMENT_INTENT_PAYMENT_FAILED,
                json!({ "id": "pi_1", "metadata": { "order_id": "O1" } }),
            ))
            .await
            .unwrap();

        let order = harness.store.order("O1").unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancellation_reason.as_deref(), Some("payment_failed"));
    }

    #[tokio::test]
    async fn test_cancellation_never_regresses_completed_order() {
        let harness = Harness::new();
        harness.store.insert_product(product("P1", "5,000 KZ", None));
        harness.store.insert_order(pending_order("O1", "P1"));
        harness
            .deliver(&succeeded_event("evt_1", 500_000, "kz", json!({ "order_id": "O1" })))
            .await
            .unwrap();

        harness
            .deliver(&event_payload(
                "evt_2",
                PAYMENT_INTENT_CANCELED,
                json!({ "id": "pi_1", "metadata": { "order_id": "O1" } }),
            ))
            .await
            .unwrap();

        assert_eq!(harness.store.order("O1").unwrap().status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_deferred_payment_instructions() {
        let harness = Harness::new();
        harness.store.insert_product(product("P1", "5,000 KZ", None));
        harness.store.insert_order(pending_order("O1", "P1"));
        harness.provider.insert(PaymentIntentSnapshot {
            id: "pi_mb".into(),
            status: "requires_action".into(),
            amount: 2550,
            currency: "EUR".into(),
            deferred: Some(DeferredPaymentDetails {
                entity: "11249".into(),
                reference: "123 456 789".into(),
                amount: 25.5,
                currency: "EUR".into(),
                expires_at: None,
                voucher_url: None,
            }),
        });

        harness
            .deliver(&event_payload(
                "evt_1",
                PAYMENT_INTENT_CREATED,
                json!({
                    "id": "pi_mb",
                    "amount": 2550,
                    "currency": "eur",
                    "status": "requires_action",
                    "payment_method_types": ["multibanco"],
                    "metadata": { "order_id": "O1" }
                }),
            ))
            .await
            .unwrap();

        let sent = harness.mail.sent();
        assert_eq!(sent.len(), 1);
        let text = sent[0].body_text.as_deref().unwrap();
        assert!(text.contains("11249"));
        assert!(text.contains("123 456 789"));
        assert!(text.contains("25.50 EUR"));
    }

    #[tokio::test]
    async fn test_deferred_lookup_failure_is_best_effort() {
        let harness = Harness::new();
        harness.store.insert_order(pending_order("O1", "P1"));
        let ack = harness
            .deliver(&event_payload(
                "evt_1",
                PAYMENT_INTENT_CREATED,
                json!({
                    "id": "pi_unknown",
                    "status": "requires_action",
                    "payment_method_types": ["multibanco"],
                    "metadata": { "order_id": "O1" }
                }),
            ))
            .await
            .unwrap();
        assert!(ack.received);
        assert!(harness.mail.sent().is_empty());
    }

    #[tokio::test]
    async fn test_card_intent_needs_no_instructions() {
        let harness = Harness::new();
        harness.store.insert_order(pending_order("O1", "P1"));
        harness
            .deliver(&event_payload(
                "evt_1",
                PAYMENT_INTENT_CREATED,
                json!({
                    "id": "pi_card",
                    "status": "requires_payment_method",
                    "payment_method_types": ["card"],
                    "metadata": { "order_id": "O1" }
                }),
            ))
            .await
            .unwrap();
        assert!(harness.mail.sent().is_empty());
    }

    #[test]
    fn test_parse_order_bumps_shapes() {
        let list = parse_order_bumps(&json!([
            { "bump_product_id": "P2", "bump_product_price": "1,500 KZ" },
            { "product_id": "P3", "price": 200, "discounted_price": "150" }
        ]));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].product_id.as_deref(), Some("P2"));
        assert_eq!(list[0].amount(), Some(1500.0));
        assert_eq!(list[1].amount(), Some(150.0));

        let single = parse_order_bumps(&json!({ "productId": "P4", "name": "Extra" }));
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].product_name.as_deref(), Some("Extra"));
        assert_eq!(single[0].amount(), None);

        let encoded = parse_order_bumps(&Value::String(r#"[{"bump_product_id":"P5"}]"#.into()));
        assert_eq!(encoded[0].product_id.as_deref(), Some("P5"));

        assert!(parse_order_bumps(&json!(null)).is_empty());
        assert!(parse_order_bumps(&Value::String("not json".into())).is_empty());
    }
}
