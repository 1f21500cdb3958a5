use super::{ReconcileError, Reconciler};
use crate::{store::CancellationReason, stripe::event::CheckoutSessionObject};

pub(super) async fn expired(
    ctx: &Reconciler,
    session: CheckoutSessionObject,
) -> Result<(), ReconcileError> {
    let Some(order_id) = session.order_id() else {
        tracing::info!(session = %session.id, "Expired session without order reference");
        return Ok(());
    };

    let reason = CancellationReason::ExpiredPaymentSession;
    let rows = ctx.store.cancel_order(order_id, reason).await?;
    tracing::info!(
        order_id = %order_id,
        session = %session.id,
        rows,
        reason = reason.as_str(),
        "Checkout session expired"
    );
    Ok(())
}
