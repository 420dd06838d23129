//! HTTP API surface: handlers and request/response models.
//!
//! Routes are assembled in [`crate::build_router`]. Customer-facing endpoints
//! live under `/api/v1`; the payment webhook sits at the root
//! (`/webhooks/payments`) because its URL is registered with the provider.

pub mod handlers;
pub mod models;
