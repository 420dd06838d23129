//! HTTP handlers for starting and abandoning a checkout.

use axum::{
    Json,
    extract::{Query, State},
    response::Redirect,
};

use crate::{
    AppState,
    api::models::checkout::{CancelQuery, CheckoutRequest, CheckoutResponse},
    errors::{Error, Result},
};

/// Reserve a slot and create the hosted payment session.
#[utoipa::path(
    post,
    path = "/checkout",
    tag = "checkout",
    summary = "Start checkout for a slot",
    description = "Reserves the slot for the customer and returns the hosted payment page URL. \
                   The reservation lapses automatically if payment is not completed in time.",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Redirect URL to the payment page", body = CheckoutResponse),
        (status = 400, description = "Slot unavailable or invalid request"),
        (status = 501, description = "No payment provider configured"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_checkout(State(state): State<AppState>, Json(data): Json<CheckoutRequest>) -> Result<Json<CheckoutResponse>> {
    if data.email.trim().is_empty() || !data.email.contains('@') {
        return Err(Error::BadRequest {
            message: "A valid customer email is required".to_string(),
        });
    }

    let checkout = state.checkout_service()?;
    let url = checkout.begin(data.slot_id, &data.customer()).await?;

    Ok(Json(CheckoutResponse { url }))
}

/// Cancel/abandon redirect target.
///
/// The payment provider sends abandoning customers here; releasing on page
/// load returns the slot to the open pool immediately instead of waiting for
/// the reservation TTL.
#[utoipa::path(
    get,
    path = "/checkout/cancel",
    tag = "checkout",
    summary = "Abandon a checkout",
    params(CancelQuery),
    responses(
        (status = 303, description = "Reservation released, redirecting home"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn cancel_checkout(State(state): State<AppState>, Query(query): Query<CancelQuery>) -> Result<Redirect> {
    // Releasing needs no payment provider; the external session is simply
    // left to expire on the provider side.
    state.reservations().release(query.slot_id).await?;

    Ok(Redirect::to("/"))
}
