use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, header},
};
use state::State;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;

pub mod config;
pub mod entity;
pub mod error;
pub mod mail;
pub mod notify;
pub mod reconcile;
mod routes;
pub mod state;
pub mod store;
pub mod stripe;

#[cfg(test)]
mod test_support;

pub use axum;
pub use sea_orm;

pub fn construct_router(state: Arc<State>) -> Router {
    let router = Router::new()
        .nest("/health", routes::health::routes())
        .nest("/webhook", routes::webhook::routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new().layer(SetResponseHeaderLayer::if_not_present(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            )),
        );

    Router::new().nest("/api/v1", router)
}
