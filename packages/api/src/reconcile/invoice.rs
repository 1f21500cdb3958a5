use super::{
    ReconcileError, Reconciler,
    pricing::{minor_to_major, split_renewal},
};
use crate::{
    store::{
        BalanceEntry, BalanceEntryKind, NewSubscriptionEvent, RenewalEntries, SubscriptionChanges,
        SubscriptionEventKind,
    },
    stripe::{WebhookEvent, event::InvoiceObject},
};

/// Ledger order id for a renewal; one per provider event so retries never collide
fn renewal_order_id(event_id: &str) -> String {
    format!("SUB-RENEWAL-{}", event_id)
}

pub(super) async fn payment_succeeded(
    ctx: &Reconciler,
    event: &WebhookEvent,
    invoice: InvoiceObject,
) -> Result<(), ReconcileError> {
    let Some(subscription_id) = invoice.subscription_id() else {
        tracing::debug!(invoice = %invoice.id, "Invoice without subscription, ignoring");
        return Ok(());
    };

    let Some((subscription, product)) = ctx.store.subscription_with_product(subscription_id).await?
    else {
        tracing::warn!(
            invoice = %invoice.id,
            subscription = %subscription_id,
            "Renewal for unknown subscription, skipping"
        );
        return Ok(());
    };

    let split = split_renewal(invoice.amount_paid)
        .map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?;
    let currency = invoice.currency.to_uppercase();
    let order_id = renewal_order_id(&event.id);

    let entries = RenewalEntries {
        credit: BalanceEntry {
            user_id: product.user_id.clone(),
            order_id: order_id.clone(),
            kind: BalanceEntryKind::SubscriptionRenewal,
            amount: minor_to_major(split.seller_net),
            currency: currency.clone(),
            description: Some(format!("Renovação de assinatura: {}", product.name)),
        },
        debit: BalanceEntry {
            user_id: product.user_id.clone(),
            order_id: order_id.clone(),
            kind: BalanceEntryKind::PlatformFee,
            amount: -minor_to_major(split.platform_fee),
            currency: currency.clone(),
            description: Some(format!("Taxa da plataforma: {}", product.name)),
        },
        event: NewSubscriptionEvent {
            subscription_id: subscription.id.clone(),
            stripe_event_id: event.id.clone(),
            kind: SubscriptionEventKind::Renewed,
            amount: Some(minor_to_major(split.gross)),
            currency: Some(currency.clone()),
            payload: event.data.object.clone(),
        },
    };
    ctx.store.record_renewal(entries).await?;

    tracing::info!(
        subscription = %subscription_id,
        seller = %product.user_id,
        gross = split.gross,
        platform_fee = split.platform_fee,
        seller_net = split.seller_net,
        order_id = %order_id,
        "Subscription renewal recorded"
    );
    Ok(())
}

pub(super) async fn payment_failed(
    ctx: &Reconciler,
    event: &WebhookEvent,
    invoice: InvoiceObject,
) -> Result<(), ReconcileError> {
    let Some(subscription_id) = invoice.subscription_id() else {
        tracing::debug!(invoice = %invoice.id, "Invoice without subscription, ignoring");
        return Ok(());
    };

    let changes = SubscriptionChanges {
        status: Some("past_due".to_string()),
        ..SubscriptionChanges::default()
    };
    let record = ctx
        .store
        .update_subscription(subscription_id, changes)
        .await?
        .ok_or_else(|| ReconcileError::NotFound(format!("Subscription {}", subscription_id)))?;

    ctx.store
        .append_subscription_event(NewSubscriptionEvent {
            subscription_id: record.id,
            stripe_event_id: event.id.clone(),
            kind: SubscriptionEventKind::PaymentFailed,
            amount: None,
            currency: Some(invoice.currency.to_uppercase()),
            payload: event.data.object.clone(),
        })
        .await?;

    tracing::warn!(subscription = %subscription_id, invoice = %invoice.id, "Renewal payment failed");
    Ok(())
}
