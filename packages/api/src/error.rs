use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{reconcile::ReconcileError, store::StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportPolicy {
    Ignore,
    Report,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    public_message: Option<String>,
    report_policy: ReportPolicy,
}

impl ApiError {
    fn new(status: StatusCode, public_message: Option<String>, report_policy: ReportPolicy) -> Self {
        Self {
            status,
            public_message,
            report_policy,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Internal error: {}", msg);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, None, ReportPolicy::Report)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Bad request: {}", msg);
        Self::new(StatusCode::BAD_REQUEST, Some(msg), ReportPolicy::Ignore)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Service unavailable: {}", msg);
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            Some("Service unavailable".to_string()),
            ReportPolicy::Report,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            error: &'a str,
            timestamp: String,
        }

        let message = self
            .public_message
            .as_deref()
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or("Error"));

        let mut response = (
            self.status,
            Json(ErrorBody {
                error: message,
                timestamp: chrono::Utc::now().to_rfc3339(),
            }),
        )
            .into_response();

        if self.report_policy == ReportPolicy::Report {
            let id = uuid::Uuid::new_v4().to_string();
            tracing::error!(error_id = %id, status = %self.status, "Reported error");
            if let Ok(v) = HeaderValue::from_str(&id) {
                response.headers_mut().insert("x-error-id", v);
            }
        }

        response
    }
}

// Every reconciliation failure is a 400
impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        tracing::error!("Database error: {:?}", err);
        Self::service_unavailable(err.to_string())
    }
}
