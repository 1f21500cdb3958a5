//! In-process payment store.
//!
//! Every operation takes one lock, so multi-row writes are trivially atomic. Used for local
//! development (`PAYMENTS_STORE_BACKEND=memory`) and as the test database.

use super::types::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct Tables {
    claimed_events: HashSet<String>,
    orders: HashMap<String, OrderRecord>,
    products: HashMap<String, ProductRecord>,
    member_areas: HashMap<String, MemberAreaRecord>,
    profiles: HashMap<String, SellerProfile>,
    subscriptions: HashMap<String, SubscriptionRecord>,
    subscription_events: Vec<NewSubscriptionEvent>,
    balance_entries: Vec<BalanceEntry>,
    member_access: HashMap<(String, String), NewMemberAccess>,
    /// Count of row writes, lets callers assert that nothing was touched
    writes: u64,
}

#[derive(Debug, Default)]
pub struct MemoryPaymentStore {
    tables: Mutex<Tables>,
}

impl MemoryPaymentStore {
    pub fn insert_order(&self, order: OrderRecord) {
        self.tables.lock().orders.insert(order.order_id.clone(), order);
    }

    pub fn insert_product(&self, product: ProductRecord) {
        self.tables.lock().products.insert(product.id.clone(), product);
    }

    pub fn insert_member_area(&self, area: MemberAreaRecord) {
        self.tables.lock().member_areas.insert(area.id.clone(), area);
    }

    pub fn insert_profile(&self, profile: SellerProfile) {
        self.tables.lock().profiles.insert(profile.user_id.clone(), profile);
    }

    pub fn order(&self, order_id: &str) -> Option<OrderRecord> {
        self.tables.lock().orders.get(order_id).cloned()
    }

    pub fn product_snapshot(&self, product_id: &str) -> Option<ProductRecord> {
        self.tables.lock().products.get(product_id).cloned()
    }

    pub fn subscription(&self, stripe_subscription_id: &str) -> Option<SubscriptionRecord> {
        self.tables
            .lock()
            .subscriptions
            .get(stripe_subscription_id)
            .cloned()
    }

    pub fn subscription_count(&self) -> usize {
        self.tables.lock().subscriptions.len()
    }

    pub fn subscription_events(&self) -> Vec<NewSubscriptionEvent> {
        self.tables.lock().subscription_events.clone()
    }

    pub fn balance_entries(&self) -> Vec<BalanceEntry> {
        self.tables.lock().balance_entries.clone()
    }

    pub fn has_event(&self, event_id: &str) -> bool {
        self.tables.lock().claimed_events.contains(event_id)
    }

    pub fn member_access(&self, member_area_id: &str, student_email: &str) -> Option<NewMemberAccess> {
        self.tables
            .lock()
            .member_access
            .get(&(member_area_id.to_string(), student_email.to_string()))
            .cloned()
    }

    pub fn write_count(&self) -> u64 {
        self.tables.lock().writes
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn claim_event(&self, event_id: &str, _event_type: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        if !tables.claimed_events.insert(event_id.to_string()) {
            return Ok(false);
        }
        tables.writes += 1;
        Ok(true)
    }

    async fn release_event(&self, event_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if tables.claimed_events.remove(event_id) {
            tables.writes += 1;
        }
        Ok(())
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.tables.lock().orders.get(order_id).cloned())
    }

    async fn complete_order(
        &self,
        order_id: &str,
        settlement: &OrderSettlement,
    ) -> Result<Option<CompletedOrder>, StoreError> {
        let mut tables = self.tables.lock();

        let Some(order) = tables.orders.get_mut(order_id) else {
            return Ok(None);
        };
        let first_completion = order.status != OrderStatus::Completed;
        order.status = OrderStatus::Completed;
        order.amount = settlement.amount.clone();
        order.currency = settlement.currency.clone();
        order.seller_commission = Some(settlement.seller_commission);
        let updated = order.clone();
        tables.writes += 1;

        if first_completion {
            if let Some(product) = updated
                .product_id
                .as_ref()
                .and_then(|id| tables.products.get_mut(id))
            {
                product.sales += 1;
                tables.writes += 1;
            }
        }

        Ok(Some(CompletedOrder {
            order: updated,
            first_completion,
        }))
    }

    async fn cancel_order(
        &self,
        order_id: &str,
        reason: CancellationReason,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        let Some(order) = tables.orders.get_mut(order_id) else {
            return Ok(0);
        };
        if order.status.is_terminal() {
            return Ok(0);
        }
        order.status = OrderStatus::Cancelled;
        order.cancellation_reason = Some(reason.as_str().to_string());
        tables.writes += 1;
        Ok(1)
    }

    async fn product(&self, product_id: &str) -> Result<Option<ProductRecord>, StoreError> {
        Ok(self.tables.lock().products.get(product_id).cloned())
    }

    async fn member_area(&self, area_id: &str) -> Result<Option<MemberAreaRecord>, StoreError> {
        Ok(self.tables.lock().member_areas.get(area_id).cloned())
    }

    async fn seller_profile(&self, user_id: &str) -> Result<Option<SellerProfile>, StoreError> {
        Ok(self.tables.lock().profiles.get(user_id).cloned())
    }

    async fn grant_member_access(&self, access: NewMemberAccess) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let key = (access.member_area_id.clone(), access.student_email.clone());
        if tables.member_access.contains_key(&key) {
            return Ok(false);
        }
        tables.member_access.insert(key, access);
        tables.writes += 1;
        Ok(true)
    }

    async fn upsert_subscription(
        &self,
        input: NewSubscription,
    ) -> Result<SubscriptionRecord, StoreError> {
        let mut tables = self.tables.lock();
        let id = tables
            .subscriptions
            .get(&input.stripe_subscription_id)
            .map(|existing| existing.id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let record = SubscriptionRecord {
            id,
            stripe_subscription_id: input.stripe_subscription_id.clone(),
            stripe_customer_id: input.stripe_customer_id,
            product_id: input.product_id,
            customer_email: input.customer_email,
            customer_name: input.customer_name,
            status: input.status,
            current_period_start: input.current_period_start,
            current_period_end: input.current_period_end,
            trial_start: input.trial_start,
            trial_end: input.trial_end,
            cancel_at_period_end: input.cancel_at_period_end,
            canceled_at: None,
            renewal_type: RENEWAL_AUTOMATIC.to_string(),
            metadata: input.metadata,
        };

        tables
            .subscriptions
            .insert(input.stripe_subscription_id, record.clone());
        tables.writes += 1;
        Ok(record)
    }

    async fn update_subscription(
        &self,
        stripe_subscription_id: &str,
        changes: SubscriptionChanges,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        let mut tables = self.tables.lock();
        let Some(sub) = tables.subscriptions.get_mut(stripe_subscription_id) else {
            return Ok(None);
        };

        if let Some(status) = changes.status {
            sub.status = status;
        }
        if let Some(start) = changes.current_period_start {
            sub.current_period_start = Some(start);
        }
        if let Some(end) = changes.current_period_end {
            sub.current_period_end = Some(end);
        }
        if let Some(flag) = changes.cancel_at_period_end {
            sub.cancel_at_period_end = flag;
        }
        if let Some(at) = changes.canceled_at {
            sub.canceled_at = at;
        }

        let updated = sub.clone();
        tables.writes += 1;
        Ok(Some(updated))
    }

    async fn subscription_with_product(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<(SubscriptionRecord, ProductRecord)>, StoreError> {
        let tables = self.tables.lock();
        let Some(sub) = tables.subscriptions.get(stripe_subscription_id) else {
            return Ok(None);
        };
        let product = sub
            .product_id
            .as_ref()
            .and_then(|id| tables.products.get(id));

        Ok(product.map(|p| (sub.clone(), p.clone())))
    }

    async fn append_subscription_event(
        &self,
        event: NewSubscriptionEvent,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        tables.subscription_events.push(event);
        tables.writes += 1;
        Ok(())
    }

    async fn record_renewal(&self, entries: RenewalEntries) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        tables.balance_entries.push(entries.credit);
        tables.balance_entries.push(entries.debit);
        tables.subscription_events.push(entries.event);
        tables.writes += 3;
        Ok(())
    }
}
