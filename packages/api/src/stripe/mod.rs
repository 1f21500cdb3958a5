pub mod event;
pub mod provider;
pub mod signature;

pub use event::{ProviderEvent, WebhookEvent};
pub use provider::{
    DeferredPaymentDetails, DynPaymentProvider, PaymentIntentSnapshot, PaymentProvider,
    StripePaymentProvider,
};
pub use signature::{SIGNATURE_HEADER, SignatureError};
