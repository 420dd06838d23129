//! HTTP handler for payment provider webhook deliveries.

use axum::{Json, extract::State, http::HeaderMap};
use serde_json::json;

use crate::{
    AppState,
    errors::{Error, Result},
    payment_providers::PaymentError,
};

/// Receive a payment webhook, verify it, and reconcile the slot state.
///
/// Response contract:
/// - 400 for signature-verification failures and events with no usable slot
///   correlation (no refund, no booking in the signature case);
/// - 200 with `{"received": true}` whenever the event was handled, whether
///   the outcome was a confirmation, a rejection-with-refund, or a duplicate
///   no-op (the provider must not redeliver those);
/// - 500 only for unexpected processing failures, which the provider retries.
#[utoipa::path(
    post,
    path = "/webhooks/payments",
    tag = "webhooks",
    summary = "Payment provider webhook",
    responses(
        (status = 200, description = "Event processed or safely rejected"),
        (status = 400, description = "Signature verification failed or missing correlation id"),
        (status = 500, description = "Unexpected processing failure, provider should retry"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn payment_webhook(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<Json<serde_json::Value>> {
    let payments = state.payments()?;

    let event = match payments.verify_webhook(&headers, &body).await {
        Ok(event) => event,
        Err(PaymentError::Verification(message)) => {
            return Err(Error::SignatureVerification { message });
        }
        Err(other) => return Err(other.into()),
    };

    let Some(event) = event else {
        // Authentic event of a type this workflow does not act on
        return Ok(Json(json!({ "received": true })));
    };

    let Some(slot_id) = event.slot_id else {
        tracing::warn!(session_id = %event.session_id, "Completion event carried no slot correlation id");
        return Err(Error::BadRequest {
            message: "Event metadata is missing the slot id".to_string(),
        });
    };

    let outcome = state.reconciler()?.process_completed_checkout(&event, slot_id).await?;
    tracing::info!(
        session_id = %event.session_id,
        booking_id = %outcome.booking().id,
        "Webhook processed"
    );

    Ok(Json(json!({ "received": true })))
}
