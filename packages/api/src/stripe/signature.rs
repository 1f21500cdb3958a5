//! Stripe webhook signature check.
//!
//! Verification goes through `stripe::Webhook::construct_event`, which checks the
//! `t=..,v1=..` header against the raw body and rejects timestamps older than five
//! minutes. Only the outcome is used here; the payload is parsed into
//! [`super::WebhookEvent`] separately, so a body the SDK cannot model is still accepted
//! once its signature holds.

use ::stripe::{Webhook, WebhookError};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("No signature matches the payload")]
    Mismatch,
    #[error("Signature timestamp {0} outside tolerance")]
    Stale(i64),
    #[error("Malformed signature header: {0}")]
    Malformed(String),
}

/// Verify `header` against the untouched request body.
pub fn verify(payload: &str, header: &str, secret: &str) -> Result<(), SignatureError> {
    match Webhook::construct_event(payload, header, secret) {
        // BadParse is only reached after the signature and timestamp checks pass
        Ok(_) | Err(WebhookError::BadParse(_)) => Ok(()),
        Err(WebhookError::BadSignature) => Err(SignatureError::Mismatch),
        Err(WebhookError::BadTimestamp(timestamp)) => Err(SignatureError::Stale(timestamp)),
        Err(other) => Err(SignatureError::Malformed(other.to_string())),
    }
}
