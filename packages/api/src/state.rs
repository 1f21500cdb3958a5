use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::{
    config::PaymentsConfig,
    mail::{DynMailClient, create_mail_client},
    notify::{DisabledWebhookFanout, DynWebhookFanout, HttpWebhookFanout, Notifier},
    reconcile::{Reconciler, ReconcilerSettings},
    store::{DynPaymentStore, StoreError, create_payment_store},
    stripe::{DynPaymentProvider, StripePaymentProvider},
};

pub type AppState = Arc<State>;

pub struct State {
    pub reconciler: Arc<Reconciler>,
    /// Present for the postgres backend; used by `/health/db`
    pub db: Option<DatabaseConnection>,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to set up webhook fan-out: {0}")]
    Fanout(anyhow::Error),
}

impl State {
    pub async fn from_config(config: &PaymentsConfig) -> Result<Self, StateError> {
        let (store, db) =
            create_payment_store(&config.store_backend, config.database_url.as_deref()).await?;
        Self::with_store(config, store, db)
    }

    /// Wire everything around an already constructed store.
    pub fn with_store(
        config: &PaymentsConfig,
        store: DynPaymentStore,
        db: Option<DatabaseConnection>,
    ) -> Result<Self, StateError> {
        let provider = match &config.secret_key {
            Some(key) => Some(Arc::new(StripePaymentProvider::new(key.clone())) as DynPaymentProvider),
            None => {
                tracing::warn!("STRIPE_SECRET_KEY not set, webhook deliveries will be rejected");
                None
            }
        };
        if config.webhook_secret.is_none() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set, webhook deliveries will be rejected");
        }

        let mail_client: Option<DynMailClient> = match &config.mail {
            Some(mail_config) => match create_mail_client(mail_config) {
                Ok(client) => {
                    tracing::info!(provider = ?mail_config.provider, "Mail client initialized");
                    Some(client)
                }
                Err(e) => {
                    tracing::error!("Failed to initialize mail client: {}", e);
                    None
                }
            },
            None => {
                tracing::info!("Mail not configured, emails are disabled");
                None
            }
        };

        let fanout: DynWebhookFanout = match &config.fanout_url {
            Some(url) => Arc::new(
                HttpWebhookFanout::new(url.clone(), config.fanout_token.clone())
                    .map_err(StateError::Fanout)?,
            ),
            None => {
                tracing::info!("WEBHOOK_FANOUT_URL not set, outbound webhooks are disabled");
                Arc::new(DisabledWebhookFanout)
            }
        };

        tracing::info!(
            rates_version = %config.exchange_rates.version,
            "Exchange rates loaded"
        );

        let reconciler = Reconciler::new(
            store,
            provider,
            Notifier::new(mail_client),
            fanout,
            config.exchange_rates.clone(),
            ReconcilerSettings {
                webhook_secret: config.webhook_secret.clone(),
                allow_unverified_succeeded: config.allow_unverified_succeeded,
                frontend_url: config.frontend_url.clone(),
            },
        );

        Ok(Self {
            reconciler: Arc::new(reconciler),
            db,
        })
    }

    /// State around an explicit reconciler, without a database.
    pub fn from_reconciler(reconciler: Reconciler) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            db: None,
        }
    }
}
