use crate::{error::ApiError, reconcile::WebhookAck, state::AppState, stripe::SIGNATURE_HEADER};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::post,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/stripe", post(stripe_webhook).options(preflight))
}

#[tracing::instrument(name = "POST /webhook/stripe", skip(state, headers, payload))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let ack = state.reconciler.handle(&payload, signature).await?;
    Ok(Json(ack))
}

#[tracing::instrument(name = "OPTIONS /webhook/stripe")]
pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("authorization, content-type, stripe-signature"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("POST, OPTIONS"),
            ),
        ],
    )
}
