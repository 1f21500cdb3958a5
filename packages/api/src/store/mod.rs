//! Payment store abstraction
//!
//! The reconciler only talks to [`PaymentStore`]. Two backends exist:
//! - **PostgreSQL**: via SeaORM against the platform tables (`orders`, `products`,
//!   `customer_subscriptions`, `subscription_events`, `balance_transactions`,
//!   `member_area_students`, `stripe_events`)
//! - **Memory**: process-local tables for local development and tests
//!
//! ## Configuration
//!
//! ```bash
//! PAYMENTS_STORE_BACKEND=postgres  # postgres, memory
//! DATABASE_URL=postgres://...
//! ```

mod memory;
mod postgres;
mod types;

pub use memory::MemoryPaymentStore;
pub use postgres::PostgresPaymentStore;
pub use types::*;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::{sync::Arc, time::Duration};

pub type DynPaymentStore = Arc<dyn PaymentStore>;

/// Backend type for payment storage
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl StoreBackend {
    /// `None` for an unrecognised backend name
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            "memory" | "mem" | "in-memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

pub async fn connect_database(url: &str, sqlx_logging: bool) -> Result<DatabaseConnection, StoreError> {
    let mut opt = ConnectOptions::new(url.to_owned());
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(sqlx_logging);

    Ok(Database::connect(opt).await?)
}

/// Build the configured store. Returns the raw connection too so health checks can ping it.
pub async fn create_payment_store(
    backend: &StoreBackend,
    database_url: Option<&str>,
) -> Result<(DynPaymentStore, Option<DatabaseConnection>), StoreError> {
    match backend {
        StoreBackend::Postgres => {
            let url = database_url.ok_or_else(|| {
                StoreError::Configuration("DATABASE_URL must be set for postgres backend".into())
            })?;
            let db = connect_database(url, false).await?;
            tracing::info!("Using PostgreSQL payment store");
            let store = PostgresPaymentStore::new(Arc::new(db.clone()));
            Ok((Arc::new(store), Some(db)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory payment store; data is lost on restart");
            Ok((Arc::new(MemoryPaymentStore::default()), None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parse() {
        assert_eq!(StoreBackend::parse("memory"), Some(StoreBackend::Memory));
        assert_eq!(StoreBackend::parse("MEM"), Some(StoreBackend::Memory));
        assert_eq!(StoreBackend::parse("postgres"), Some(StoreBackend::Postgres));
        assert_eq!(StoreBackend::parse("mysql"), None);
        assert_eq!(StoreBackend::parse(""), None);
    }

    #[tokio::test]
    async fn test_postgres_backend_requires_url() {
        let result = create_payment_store(&StoreBackend::Postgres, None).await;
        assert!(matches!(result, Err(StoreError::Configuration(_))));
    }
}
