#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use axum::{Router, routing::get};
use kambafy_api::{construct_router, state::State};
use std::sync::Arc;

mod config;
mod metrics;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    metrics::init_telemetry();

    tracing::info!("Starting Kambafy payment webhook service");

    let config = config::Config::from_env()?;
    tracing::info!(
        backend = ?config.payments.store_backend,
        rates_version = %config.payments.exchange_rates.version,
        "Loaded configuration"
    );

    let state = Arc::new(State::from_config(&config.payments).await?);

    let app = Router::new()
        .merge(construct_router(state))
        .route("/metrics", get(metrics::handler));

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
