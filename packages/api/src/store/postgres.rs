//! PostgreSQL payment store implementation using SeaORM

use super::types::*;
use async_trait::async_trait;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, OnConflict},
};
use std::sync::Arc;

use crate::entity::{
    balance_transaction, customer_subscription, member_area, member_area_student, order, product,
    profile,
    sea_orm_active_enums::{
        BalanceTransactionType as EntityBalanceType, OrderStatus as EntityOrderStatus,
        SubscriptionEventType as EntitySubscriptionEventType,
    },
    stripe_event, subscription_event,
};

#[derive(Debug, Clone)]
pub struct PostgresPaymentStore {
    db: Arc<DatabaseConnection>,
}

impl PostgresPaymentStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

// Conversion helpers
fn entity_order_status_to_type(s: EntityOrderStatus) -> OrderStatus {
    match s {
        EntityOrderStatus::Pending => OrderStatus::Pending,
        EntityOrderStatus::Completed => OrderStatus::Completed,
        EntityOrderStatus::Cancelled => OrderStatus::Cancelled,
        EntityOrderStatus::Failed => OrderStatus::Failed,
        EntityOrderStatus::Expired => OrderStatus::Expired,
    }
}

fn type_event_kind_to_entity(k: SubscriptionEventKind) -> EntitySubscriptionEventType {
    match k {
        SubscriptionEventKind::Created => EntitySubscriptionEventType::Created,
        SubscriptionEventKind::Updated => EntitySubscriptionEventType::Updated,
        SubscriptionEventKind::Canceled => EntitySubscriptionEventType::Canceled,
        SubscriptionEventKind::Renewed => EntitySubscriptionEventType::Renewed,
        SubscriptionEventKind::PaymentFailed => EntitySubscriptionEventType::PaymentFailed,
    }
}

fn type_balance_kind_to_entity(k: BalanceEntryKind) -> EntityBalanceType {
    match k {
        BalanceEntryKind::SubscriptionRenewal => EntityBalanceType::SubscriptionRenewal,
        BalanceEntryKind::PlatformFee => EntityBalanceType::PlatformFee,
    }
}

fn order_model_to_record(m: order::Model) -> OrderRecord {
    OrderRecord {
        order_id: m.order_id,
        product_id: m.product_id,
        user_id: m.user_id,
        customer_email: m.customer_email,
        customer_name: m.customer_name,
        amount: m.amount,
        currency: m.currency,
        seller_commission: m.seller_commission,
        status: entity_order_status_to_type(m.status),
        cancellation_reason: m.cancellation_reason,
        affiliate_code: m.affiliate_code,
        payment_method: m.payment_method,
        order_bump_data: m.order_bump_data,
    }
}

fn product_model_to_record(m: product::Model) -> ProductRecord {
    ProductRecord {
        id: m.id,
        name: m.name,
        price: m.price,
        user_id: m.user_id,
        sales: m.sales,
        member_area_id: m.member_area_id,
    }
}

fn subscription_model_to_record(m: customer_subscription::Model) -> SubscriptionRecord {
    SubscriptionRecord {
        id: m.id,
        stripe_subscription_id: m.stripe_subscription_id,
        stripe_customer_id: m.stripe_customer_id,
        product_id: m.product_id,
        customer_email: m.customer_email,
        customer_name: m.customer_name,
        status: m.status,
        current_period_start: m.current_period_start,
        current_period_end: m.current_period_end,
        trial_start: m.trial_start,
        trial_end: m.trial_end,
        cancel_at_period_end: m.cancel_at_period_end,
        canceled_at: m.canceled_at,
        renewal_type: m.renewal_type,
        metadata: m.metadata,
    }
}

fn subscription_event_active_model(event: NewSubscriptionEvent) -> subscription_event::ActiveModel {
    subscription_event::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        subscription_id: Set(event.subscription_id),
        stripe_event_id: Set(event.stripe_event_id),
        event_type: Set(type_event_kind_to_entity(event.kind)),
        amount: Set(event.amount),
        currency: Set(event.currency),
        payload: Set(event.payload),
        created_at: Set(chrono::Utc::now().naive_utc()),
    }
}

fn balance_active_model(entry: BalanceEntry) -> balance_transaction::ActiveModel {
    balance_transaction::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        user_id: Set(entry.user_id),
        order_id: Set(entry.order_id),
        transaction_type: Set(type_balance_kind_to_entity(entry.kind)),
        amount: Set(entry.amount),
        currency: Set(entry.currency),
        description: Set(entry.description),
        created_at: Set(chrono::Utc::now().naive_utc()),
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn claim_event(&self, event_id: &str, event_type: &str) -> Result<bool, StoreError> {
        let new_event = stripe_event::ActiveModel {
            id: Set(event_id.to_string()),
            event_type: Set(event_type.to_string()),
            processed_at: Set(chrono::Utc::now().naive_utc()),
        };

        let inserted = stripe_event::Entity::insert(new_event)
            .on_conflict(
                OnConflict::column(stripe_event::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        Ok(inserted == 1)
    }

    async fn release_event(&self, event_id: &str) -> Result<(), StoreError> {
        stripe_event::Entity::delete_by_id(event_id)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        let model = order::Entity::find()
            .filter(order::Column::OrderId.eq(order_id))
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(order_model_to_record))
    }

    async fn complete_order(
        &self,
        order_id: &str,
        settlement: &OrderSettlement,
    ) -> Result<Option<CompletedOrder>, StoreError> {
        let txn = self.db.begin().await?;

        // row lock serialises concurrent completions of the same order
        let Some(current) = order::Entity::find()
            .filter(order::Column::OrderId.eq(order_id))
            .lock_exclusive()
            .one(&txn)
            .await?
        else {
            txn.rollback().await?;
            return Ok(None);
        };
        let first_completion = current.status != EntityOrderStatus::Completed;

        let mut active: order::ActiveModel = current.into();
        active.status = Set(EntityOrderStatus::Completed);
        active.amount = Set(settlement.amount.clone());
        active.currency = Set(settlement.currency.clone());
        active.seller_commission = Set(Some(settlement.seller_commission));
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        let model = active.update(&txn).await?;

        if first_completion {
            if let Some(product_id) = &model.product_id {
                product::Entity::update_many()
                    .col_expr(
                        product::Column::Sales,
                        Expr::col(product::Column::Sales).add(1),
                    )
                    .filter(product::Column::Id.eq(product_id.as_str()))
                    .exec(&txn)
                    .await?;
            }
        }

        txn.commit().await?;
        Ok(Some(CompletedOrder {
            order: order_model_to_record(model),
            first_completion,
        }))
    }

    async fn cancel_order(
        &self,
        order_id: &str,
        reason: CancellationReason,
    ) -> Result<u64, StoreError> {
        let result = order::Entity::update_many()
            .col_expr(
                order::Column::Status,
                Expr::value(EntityOrderStatus::Cancelled.to_value()),
            )
            .col_expr(
                order::Column::CancellationReason,
                Expr::value(reason.as_str()),
            )
            .col_expr(
                order::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().naive_utc()),
            )
            .filter(order::Column::OrderId.eq(order_id))
            .filter(order::Column::Status.is_not_in([
                EntityOrderStatus::Completed,
                EntityOrderStatus::Cancelled,
                EntityOrderStatus::Expired,
            ]))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn product(&self, product_id: &str) -> Result<Option<ProductRecord>, StoreError> {
        let model = product::Entity::find_by_id(product_id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(product_model_to_record))
    }

    async fn member_area(&self, area_id: &str) -> Result<Option<MemberAreaRecord>, StoreError> {
        let model = member_area::Entity::find_by_id(area_id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(|m| MemberAreaRecord {
            id: m.id,
            name: m.name,
            url: m.url,
            user_id: m.user_id,
        }))
    }

    async fn seller_profile(&self, user_id: &str) -> Result<Option<SellerProfile>, StoreError> {
        let model = profile::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(|m| SellerProfile {
            user_id: m.user_id,
            full_name: m.full_name,
            email: m.email,
        }))
    }

    async fn grant_member_access(&self, access: NewMemberAccess) -> Result<bool, StoreError> {
        use member_area_student::Column;

        let new_access = member_area_student::ActiveModel {
            member_area_id: Set(access.member_area_id),
            student_email: Set(access.student_email),
            student_name: Set(access.student_name),
            credential_hash: Set(access.credential_hash),
            created_at: Set(chrono::Utc::now().naive_utc()),
        };

        let inserted = member_area_student::Entity::insert(new_access)
            .on_conflict(
                OnConflict::columns([Column::MemberAreaId, Column::StudentEmail])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        Ok(inserted == 1)
    }

    async fn upsert_subscription(
        &self,
        input: NewSubscription,
    ) -> Result<SubscriptionRecord, StoreError> {
        use customer_subscription::Column;

        let now = chrono::Utc::now().naive_utc();
        let stripe_subscription_id = input.stripe_subscription_id.clone();

        let new_subscription = customer_subscription::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            stripe_subscription_id: Set(input.stripe_subscription_id),
            stripe_customer_id: Set(input.stripe_customer_id),
            product_id: Set(input.product_id),
            customer_email: Set(input.customer_email),
            customer_name: Set(input.customer_name),
            status: Set(input.status),
            current_period_start: Set(input.current_period_start),
            current_period_end: Set(input.current_period_end),
            trial_start: Set(input.trial_start),
            trial_end: Set(input.trial_end),
            cancel_at_period_end: Set(input.cancel_at_period_end),
            canceled_at: Set(None),
            renewal_type: Set(RENEWAL_AUTOMATIC.to_string()),
            metadata: Set(input.metadata),
            created_at: Set(now),
            updated_at: Set(now),
        };

        customer_subscription::Entity::insert(new_subscription)
            .on_conflict(
                OnConflict::column(Column::StripeSubscriptionId)
                    .update_columns([
                        Column::StripeCustomerId,
                        Column::ProductId,
                        Column::CustomerEmail,
                        Column::CustomerName,
                        Column::Status,
                        Column::CurrentPeriodStart,
                        Column::CurrentPeriodEnd,
                        Column::TrialStart,
                        Column::TrialEnd,
                        Column::CancelAtPeriodEnd,
                        Column::RenewalType,
                        Column::Metadata,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        let model = customer_subscription::Entity::find()
            .filter(Column::StripeSubscriptionId.eq(stripe_subscription_id.as_str()))
            .one(self.db.as_ref())
            .await?
            .ok_or(StoreError::NotFound(stripe_subscription_id))?;

        Ok(subscription_model_to_record(model))
    }

    async fn update_subscription(
        &self,
        stripe_subscription_id: &str,
        changes: SubscriptionChanges,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        let existing = customer_subscription::Entity::find()
            .filter(customer_subscription::Column::StripeSubscriptionId.eq(stripe_subscription_id))
            .one(self.db.as_ref())
            .await?;

        let Some(model) = existing else {
            return Ok(None);
        };

        let mut active: customer_subscription::ActiveModel = model.into();
        if let Some(status) = changes.status {
            active.status = Set(status);
        }
        if let Some(start) = changes.current_period_start {
            active.current_period_start = Set(Some(start));
        }
        if let Some(end) = changes.current_period_end {
            active.current_period_end = Set(Some(end));
        }
        if let Some(flag) = changes.cancel_at_period_end {
            active.cancel_at_period_end = Set(flag);
        }
        if let Some(at) = changes.canceled_at {
            active.canceled_at = Set(at);
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc());

        let updated = active.update(self.db.as_ref()).await?;
        Ok(Some(subscription_model_to_record(updated)))
    }

    async fn subscription_with_product(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<(SubscriptionRecord, ProductRecord)>, StoreError> {
        let result = customer_subscription::Entity::find()
            .filter(customer_subscription::Column::StripeSubscriptionId.eq(stripe_subscription_id))
            .find_also_related(product::Entity)
            .one(self.db.as_ref())
            .await?;

        Ok(match result {
            Some((sub, Some(prod))) => Some((
                subscription_model_to_record(sub),
                product_model_to_record(prod),
            )),
            _ => None,
        })
    }

    async fn append_subscription_event(
        &self,
        event: NewSubscriptionEvent,
    ) -> Result<(), StoreError> {
        subscription_event_active_model(event)
            .insert(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn record_renewal(&self, entries: RenewalEntries) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        balance_active_model(entries.credit).insert(&txn).await?;
        balance_active_model(entries.debit).insert(&txn).await?;
        subscription_event_active_model(entries.event)
            .insert(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }
}
