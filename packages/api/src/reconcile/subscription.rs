use super::{ReconcileError, Reconciler};
use crate::{
    store::{NewSubscription, NewSubscriptionEvent, SubscriptionChanges, SubscriptionEventKind},
    stripe::{
        WebhookEvent,
        event::{SubscriptionObject, unix_to_naive},
    },
};

fn audit_event(
    subscription_id: &str,
    event: &WebhookEvent,
    kind: SubscriptionEventKind,
) -> NewSubscriptionEvent {
    NewSubscriptionEvent {
        subscription_id: subscription_id.to_string(),
        stripe_event_id: event.id.clone(),
        kind,
        amount: None,
        currency: None,
        payload: event.data.object.clone(),
    }
}

pub(super) async fn created(
    ctx: &Reconciler,
    event: &WebhookEvent,
    sub: SubscriptionObject,
) -> Result<(), ReconcileError> {
    let metadata = serde_json::to_value(&sub.metadata).unwrap_or_default();
    let record = ctx
        .store
        .upsert_subscription(NewSubscription {
            stripe_subscription_id: sub.id.clone(),
            stripe_customer_id: sub.customer.clone(),
            product_id: sub.metadata.get("product_id").cloned(),
            customer_email: sub.metadata.get("customer_email").cloned(),
            customer_name: sub.metadata.get("customer_name").cloned(),
            status: sub.status.clone(),
            current_period_start: unix_to_naive(sub.current_period_start),
            current_period_end: unix_to_naive(sub.current_period_end),
            trial_start: unix_to_naive(sub.trial_start),
            trial_end: unix_to_naive(sub.trial_end),
            cancel_at_period_end: sub.cancel_at_period_end,
            metadata,
        })
        .await?;

    ctx.store
        .append_subscription_event(audit_event(&record.id, event, SubscriptionEventKind::Created))
        .await?;

    tracing::info!(
        subscription = %sub.id,
        status = %sub.status,
        product_id = ?record.product_id,
        "Subscription created"
    );
    Ok(())
}

pub(super) async fn updated(
    ctx: &Reconciler,
    event: &WebhookEvent,
    sub: SubscriptionObject,
) -> Result<(), ReconcileError> {
    let changes = SubscriptionChanges {
        status: Some(sub.status.clone()),
        current_period_start: unix_to_naive(sub.current_period_start),
        current_period_end: unix_to_naive(sub.current_period_end),
        cancel_at_period_end: Some(sub.cancel_at_period_end),
        canceled_at: Some(unix_to_naive(sub.canceled_at)),
    };

    let record = ctx
        .store
        .update_subscription(&sub.id, changes)
        .await?
        .ok_or_else(|| ReconcileError::NotFound(format!("Subscription {}", sub.id)))?;

    ctx.store
        .append_subscription_event(audit_event(&record.id, event, SubscriptionEventKind::Updated))
        .await?;

    tracing::info!(subscription = %sub.id, status = %sub.status, "Subscription updated");
    Ok(())
}

pub(super) async fn deleted(
    ctx: &Reconciler,
    event: &WebhookEvent,
    sub: SubscriptionObject,
) -> Result<(), ReconcileError> {
    let canceled_at =
        unix_to_naive(sub.canceled_at).unwrap_or_else(|| chrono::Utc::now().naive_utc());
    let changes = SubscriptionChanges {
        status: Some("canceled".to_string()),
        canceled_at: Some(Some(canceled_at)),
        ..SubscriptionChanges::default()
    };

    let Some(record) = ctx.store.update_subscription(&sub.id, changes).await? else {
        tracing::warn!(subscription = %sub.id, "Cancellation for unknown subscription");
        return Ok(());
    };

    ctx.store
        .append_subscription_event(audit_event(&record.id, event, SubscriptionEventKind::Canceled))
        .await?;

    tracing::info!(subscription = %sub.id, "Subscription canceled");
    Ok(())
}
