//! HTTP handlers for booking reads and admin cancellation.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{
    AppState,
    api::models::bookings::{BookingResponse, ListBookingsQuery},
    auth::AdminToken,
    errors::{Error, Result},
    store::models::{BookingStatus, SlotStatus},
    types::BookingId,
};

/// Look up a booking by its checkout-session id.
///
/// The confirmation page polls this until the webhook lands and the booking
/// appears (or its own timeout elapses).
#[utoipa::path(
    get,
    path = "/bookings/by-session/{session_id}",
    tag = "bookings",
    summary = "Get booking by checkout session",
    params(("session_id" = String, Path, description = "External checkout-session id")),
    responses(
        (status = 200, description = "Booking for the session", body = BookingResponse),
        (status = 404, description = "No booking recorded for this session yet"),
    )
)]
#[tracing::instrument(skip_all, fields(session_id = %session_id))]
pub async fn get_booking_by_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<BookingResponse>> {
    let booking = state
        .store
        .booking_by_payment_id(&session_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Booking".to_string(),
            id: session_id.clone(),
        })?;

    Ok(Json(BookingResponse::from(booking)))
}

/// List a customer's bookings, served through the read-through cache.
#[utoipa::path(
    get,
    path = "/bookings",
    tag = "bookings",
    summary = "List bookings for a customer",
    params(ListBookingsQuery),
    responses(
        (status = 200, description = "Bookings attributed to the email", body = [BookingResponse]),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all, fields(email = %query.email))]
pub async fn list_bookings(State(state): State<AppState>, Query(query): Query<ListBookingsQuery>) -> Result<Json<Vec<BookingResponse>>> {
    if let Some(cached) = state.cache.get(&query.email).await {
        tracing::debug!("Serving bookings from cache");
        return Ok(Json(cached.iter().cloned().map(BookingResponse::from).collect()));
    }

    let bookings = state.store.bookings_for_email(&query.email).await?;
    state.cache.insert(&query.email, bookings.clone()).await;

    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

/// Cancel a confirmed booking (admin): refund the payment, mark the booking
/// cancelled, and reopen the slot.
#[utoipa::path(
    post,
    path = "/bookings/{id}/cancel",
    tag = "bookings",
    summary = "Cancel a confirmed booking",
    params(("id" = String, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking cancelled and refunded", body = BookingResponse),
        (status = 400, description = "Booking is not in a cancellable state"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Booking not found"),
        (status = 501, description = "No payment provider configured"),
    ),
    security(("AdminBearer" = []))
)]
#[tracing::instrument(skip_all, fields(booking_id = %id))]
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<BookingId>,
    _admin: AdminToken,
) -> Result<Json<BookingResponse>> {
    let payments = state.payments()?;

    let booking = state.store.booking(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Booking".to_string(),
        id: id.to_string(),
    })?;

    if !state.store.cancel_booking(id).await? {
        return Err(Error::BadRequest {
            message: format!("Booking {id} is {} and cannot be cancelled", booking.status.as_str()),
        });
    }

    payments.refund(&booking.external_payment_id).await?;
    state.store.mark_refunded(id).await?;

    // Reopen the hour so it becomes sellable again, but only if the slot is
    // still held as booked; a slot that was deleted or already recycled is
    // left alone.
    if let Some(slot) = state.store.slot(booking.slot_id).await?
        && slot.status == SlotStatus::Booked
    {
        state.store.release_slot(booking.slot_id).await?;
        tracing::info!(slot_id = %booking.slot_id, "Reopened slot after cancellation");
    }

    state.cache.invalidate(&booking.email).await;

    let cancelled = state.store.booking(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Booking".to_string(),
        id: id.to_string(),
    })?;

    tracing::info!("Cancelled booking");
    debug_assert_eq!(cancelled.status, BookingStatus::Cancelled);
    Ok(Json(BookingResponse::from(cancelled)))
}
