//! Doubles and fixtures shared by unit tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::{collections::HashMap, sync::Arc};

use crate::{
    mail::{EmailMessage, MailClient},
    notify::{Notifier, WebhookDelivery, WebhookFanout},
    reconcile::{Reconciler, ReconcilerSettings, pricing::ExchangeRates},
    store::{MemberAreaRecord, MemoryPaymentStore, OrderRecord, OrderStatus, ProductRecord, SellerProfile},
    stripe::{PaymentIntentSnapshot, PaymentProvider},
};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

#[derive(Default)]
pub struct RecordingMailClient {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailClient {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MailClient for RecordingMailClient {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        self.sent.lock().push(message);
        Ok(())
    }

    fn from_email(&self) -> &str {
        "noreply@kambafy.com"
    }

    fn from_name(&self) -> &str {
        "Kambafy"
    }
}

#[derive(Default)]
pub struct RecordingFanout {
    deliveries: Mutex<Vec<WebhookDelivery>>,
}

impl RecordingFanout {
    pub fn deliveries(&self) -> Vec<WebhookDelivery> {
        self.deliveries.lock().clone()
    }
}

#[async_trait]
impl WebhookFanout for RecordingFanout {
    async fn dispatch(&self, delivery: WebhookDelivery) -> Result<()> {
        self.deliveries.lock().push(delivery);
        Ok(())
    }
}

/// Serves canned payment intents; unknown ids fail like a provider 404.
#[derive(Default)]
pub struct FakePaymentProvider {
    intents: Mutex<HashMap<String, PaymentIntentSnapshot>>,
}

impl FakePaymentProvider {
    pub fn insert(&self, snapshot: PaymentIntentSnapshot) {
        self.intents.lock().insert(snapshot.id.clone(), snapshot);
    }
}

#[async_trait]
impl PaymentProvider for FakePaymentProvider {
    async fn payment_intent(&self, id: &str) -> Result<PaymentIntentSnapshot> {
        self.intents
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("No such payment_intent: '{}'", id))
    }
}

pub fn pending_order(order_id: &str, product_id: &str) -> OrderRecord {
    OrderRecord {
        order_id: order_id.to_string(),
        product_id: Some(product_id.to_string()),
        user_id: Some("user123".to_string()),
        customer_email: "buyer@example.com".to_string(),
        customer_name: "Ana Buyer".to_string(),
        amount: "0".to_string(),
        currency: "KZ".to_string(),
        seller_commission: None,
        status: OrderStatus::Pending,
        cancellation_reason: None,
        affiliate_code: None,
        payment_method: None,
        order_bump_data: None,
    }
}

pub fn product(id: &str, price: &str, member_area_id: Option<&str>) -> ProductRecord {
    ProductRecord {
        id: id.to_string(),
        name: format!("Curso {}", id),
        price: price.to_string(),
        user_id: "user123".to_string(),
        sales: 0,
        member_area_id: member_area_id.map(str::to_string),
    }
}

pub fn member_area(id: &str) -> MemberAreaRecord {
    MemberAreaRecord {
        id: id.to_string(),
        name: format!("Area {}", id),
        url: format!("https://kambafy.com/area/{}", id),
        user_id: "user123".to_string(),
    }
}

pub fn seller() -> SellerProfile {
    SellerProfile {
        user_id: "user123".to_string(),
        full_name: Some("Seller Name".to_string()),
        email: Some("seller@example.com".to_string()),
    }
}

/// Webhook envelope around `object`
pub fn event_payload(event_id: &str, event_type: &str, object: Value) -> Vec<u8> {
    json!({
        "id": event_id,
        "type": event_type,
        "created": 1_700_000_000,
        "livemode": false,
        "data": { "object": object }
    })
    .to_string()
    .into_bytes()
}

/// `stripe-signature` header value for `payload`, as Stripe computes it
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub fn sign_now(payload: &[u8]) -> String {
    sign(payload, WEBHOOK_SECRET, chrono::Utc::now().timestamp())
}

pub struct Harness {
    pub store: Arc<MemoryPaymentStore>,
    pub provider: Arc<FakePaymentProvider>,
    pub mail: Arc<RecordingMailClient>,
    pub fanout: Arc<RecordingFanout>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(ReconcilerSettings {
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            ..ReconcilerSettings::default()
        })
    }

    pub fn with_settings(settings: ReconcilerSettings) -> Self {
        let store = Arc::new(MemoryPaymentStore::default());
        let provider = Arc::new(FakePaymentProvider::default());
        let mail = Arc::new(RecordingMailClient::default());
        let fanout = Arc::new(RecordingFanout::default());

        let reconciler = Reconciler::new(
            store.clone(),
            Some(provider.clone()),
            Notifier::new(Some(mail.clone())),
            fanout.clone(),
            ExchangeRates::default(),
            settings,
        );

        Self {
            store,
            provider,
            mail,
            fanout,
            reconciler,
        }
    }

    /// Sign and deliver one event
    pub async fn deliver(
        &self,
        payload: &[u8],
    ) -> Result<crate::reconcile::WebhookAck, crate::reconcile::ReconcileError> {
        let header = sign_now(payload);
        self.reconciler.handle(payload, Some(&header)).await
    }
}
