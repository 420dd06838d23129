//! Payment provider abstraction layer
//!
//! This module defines the `PaymentProvider` trait which abstracts hosted
//! checkout, refunds, and webhook verification across different payment
//! providers (Stripe, etc.).

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::PaymentConfig;
use crate::store::models::{Customer, Slot};
use crate::types::SlotId;

pub mod dummy;
pub mod signing;
pub mod stripe;

/// Create a payment provider from configuration
///
/// This is the single point where we convert config into provider instances.
/// Adding a new provider requires adding a match arm here.
pub fn create_provider(config: &PaymentConfig) -> Arc<dyn PaymentProvider> {
    match config {
        PaymentConfig::Stripe(stripe_config) => Arc::new(stripe::StripeProvider::from(stripe_config.clone())),
        PaymentConfig::Dummy(dummy_config) => Arc::new(dummy::DummyProvider::from(dummy_config.clone())),
    }
}

/// Result type for payment provider operations
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors that can occur during payment processing
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider API error: {0}")]
    ProviderApi(String),

    #[error("Invalid payment data: {0}")]
    InvalidData(String),

    #[error("Webhook verification failed: {0}")]
    Verification(String),
}

impl From<&PaymentError> for StatusCode {
    fn from(err: &PaymentError) -> Self {
        match err {
            PaymentError::Verification(_) => StatusCode::BAD_REQUEST,
            PaymentError::InvalidData(_) => StatusCode::BAD_REQUEST,
            PaymentError::ProviderApi(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A hosted checkout session created with the provider. The customer is
/// redirected to `url`; `session_id` is attached to the reserved slot.
#[derive(Debug, Clone)]
pub struct HostedCheckout {
    pub session_id: String,
    pub url: String,
}

/// A verified payment-completion event, reduced to the fields the
/// reconciler needs. `slot_id` is absent when the provider event carried no
/// usable correlation metadata; the webhook handler rejects those.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedCheckout {
    pub session_id: String,
    pub slot_id: Option<SlotId>,
    pub customer: Customer,
}

/// Abstract payment provider interface
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session for one slot.
    ///
    /// The slot must already be reserved by the caller; the session expiry is
    /// aligned with the reservation TTL so the provider stops accepting
    /// payment around the time the reservation lapses.
    async fn create_checkout_session(
        &self,
        slot: &Slot,
        customer: &Customer,
        success_url: &str,
        cancel_url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<HostedCheckout>;

    /// Refund the payment taken through a checkout session.
    async fn refund(&self, session_id: &str) -> Result<()>;

    /// Verify the authenticity of a webhook delivery and extract the
    /// completion event, if any.
    ///
    /// Returns `Ok(None)` for authentic events of types this workflow does
    /// not act on. Returns [`PaymentError::Verification`] when the signature
    /// check fails; no domain action may be taken in that case.
    async fn verify_webhook(&self, headers: &axum::http::HeaderMap, body: &str) -> Result<Option<CompletedCheckout>>;
}
