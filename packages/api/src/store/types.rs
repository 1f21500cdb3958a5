//! Types for the payment store abstraction

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Order lifecycle (matches the `orders.status` column)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
    Failed,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }
}

/// Why an order was cancelled by the reconciler
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancellationReason {
    PaymentFailed,
    ExpiredPaymentSession,
}

impl CancellationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentFailed => "payment_failed",
            Self::ExpiredPaymentSession => "expired_payment_session",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub product_id: Option<String>,
    pub user_id: Option<String>,
    pub customer_email: String,
    pub customer_name: String,
    pub amount: String,
    pub currency: String,
    pub seller_commission: Option<f64>,
    pub status: OrderStatus,
    pub cancellation_reason: Option<String>,
    pub affiliate_code: Option<String>,
    pub payment_method: Option<String>,
    pub order_bump_data: Option<serde_json::Value>,
}

/// Fields written when an order settles
#[derive(Clone, Debug, PartialEq)]
pub struct OrderSettlement {
    pub amount: String,
    pub currency: String,
    pub seller_commission: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub price: String,
    pub user_id: String,
    pub sales: i32,
    pub member_area_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberAreaRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    pub user_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SellerProfile {
    pub user_id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

pub const RENEWAL_AUTOMATIC: &str = "automatic";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    pub product_id: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub status: String,
    pub current_period_start: Option<NaiveDateTime>,
    pub current_period_end: Option<NaiveDateTime>,
    pub trial_start: Option<NaiveDateTime>,
    pub trial_end: Option<NaiveDateTime>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<NaiveDateTime>,
    pub renewal_type: String,
    pub metadata: serde_json::Value,
}

/// Input for `upsert_subscription`
#[derive(Clone, Debug)]
pub struct NewSubscription {
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    pub product_id: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub status: String,
    pub current_period_start: Option<NaiveDateTime>,
    pub current_period_end: Option<NaiveDateTime>,
    pub trial_start: Option<NaiveDateTime>,
    pub trial_end: Option<NaiveDateTime>,
    pub cancel_at_period_end: bool,
    pub metadata: serde_json::Value,
}

/// Partial update for `update_subscription`; `None` leaves a column untouched
#[derive(Clone, Debug, Default)]
pub struct SubscriptionChanges {
    pub status: Option<String>,
    pub current_period_start: Option<NaiveDateTime>,
    pub current_period_end: Option<NaiveDateTime>,
    pub cancel_at_period_end: Option<bool>,
    /// `Some(None)` clears the timestamp, e.g. when a subscription is reactivated
    pub canceled_at: Option<Option<NaiveDateTime>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionEventKind {
    Created,
    Updated,
    Canceled,
    Renewed,
    PaymentFailed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewSubscriptionEvent {
    pub subscription_id: String,
    pub stripe_event_id: String,
    pub kind: SubscriptionEventKind,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub payload: serde_json::Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceEntryKind {
    SubscriptionRenewal,
    PlatformFee,
}

/// Ledger entry; `amount` is signed, in major units like order amounts
#[derive(Clone, Debug, PartialEq)]
pub struct BalanceEntry {
    pub user_id: String,
    pub order_id: String,
    pub kind: BalanceEntryKind,
    pub amount: f64,
    pub currency: String,
    pub description: Option<String>,
}

/// Result of `complete_order`
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedOrder {
    pub order: OrderRecord,
    /// False when the order was already completed before this call
    pub first_completion: bool,
}

/// A student's access to a member area. Only the credential's hash is persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMemberAccess {
    pub member_area_id: String,
    pub student_email: String,
    pub student_name: String,
    pub credential_hash: String,
}

/// Everything written for one subscription renewal, applied together
#[derive(Clone, Debug, PartialEq)]
pub struct RenewalEntries {
    pub credit: BalanceEntry,
    pub debit: BalanceEntry,
    pub event: NewSubscriptionEvent,
}

/// Error type for payment store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Persistence used by the reconciler.
///
/// Multi-row writes (`complete_order`, `record_renewal`) are atomic: either every row
/// lands or none does.
#[async_trait]
pub trait PaymentStore: Send + Sync + Debug {
    /// Records `event_id` before it is handled. Returns `false` when the id is already
    /// claimed, either by a finished delivery or by one still in flight.
    async fn claim_event(&self, event_id: &str, event_type: &str) -> Result<bool, StoreError>;

    /// Drops a claim after a failed delivery so the provider's retry is handled again.
    async fn release_event(&self, event_id: &str) -> Result<(), StoreError>;

    async fn find_order(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError>;

    /// Marks the order completed with the settled amounts. The product's sales counter is
    /// bumped by one only on the first completion. Returns `None` if no order matched.
    async fn complete_order(
        &self,
        order_id: &str,
        settlement: &OrderSettlement,
    ) -> Result<Option<CompletedOrder>, StoreError>;

    /// Cancels a non-terminal order. Returns the number of rows changed, so an unknown or
    /// already settled order yields `0`.
    async fn cancel_order(
        &self,
        order_id: &str,
        reason: CancellationReason,
    ) -> Result<u64, StoreError>;

    async fn product(&self, product_id: &str) -> Result<Option<ProductRecord>, StoreError>;

    async fn member_area(&self, area_id: &str) -> Result<Option<MemberAreaRecord>, StoreError>;

    async fn seller_profile(&self, user_id: &str) -> Result<Option<SellerProfile>, StoreError>;

    /// Returns `false` if the student already had access; the stored credential is kept.
    async fn grant_member_access(&self, access: NewMemberAccess) -> Result<bool, StoreError>;

    async fn upsert_subscription(
        &self,
        input: NewSubscription,
    ) -> Result<SubscriptionRecord, StoreError>;

    async fn update_subscription(
        &self,
        stripe_subscription_id: &str,
        changes: SubscriptionChanges,
    ) -> Result<Option<SubscriptionRecord>, StoreError>;

    async fn subscription_with_product(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<(SubscriptionRecord, ProductRecord)>, StoreError>;

    async fn append_subscription_event(&self, event: NewSubscriptionEvent)
    -> Result<(), StoreError>;

    async fn record_renewal(&self, entries: RenewalEntries) -> Result<(), StoreError>;
}
