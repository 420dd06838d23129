use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::store::models::{Booking, BookingStatus, LessonCategory, Location};
use crate::types::{BookingId, SlotId, UserId};

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingResponse {
    /// Booking ID
    #[schema(value_type = String, format = "uuid")]
    pub id: BookingId,
    /// The slot this booking was for
    #[schema(value_type = String, format = "uuid")]
    pub slot_id: SlotId,
    pub status: BookingStatus,
    /// The checkout-session id, for support references and confirmation polling
    pub payment_id: String,
    /// Lesson start, from the slot snapshot (absent when the slot record was
    /// unreadable at reconciliation time)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<LessonCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    #[schema(value_type = Option<String>, format = "uuid")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub refunded: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        let snapshot = booking.snapshot;
        Self {
            id: booking.id,
            slot_id: booking.slot_id,
            status: booking.status,
            payment_id: booking.external_payment_id,
            start: snapshot.as_ref().map(|s| s.start),
            end: snapshot.as_ref().map(|s| s.end),
            location: snapshot.as_ref().map(|s| s.location),
            category: snapshot.as_ref().map(|s| s.category),
            price: snapshot.as_ref().map(|s| s.price),
            user_id: booking.user_id,
            email: booking.email,
            failure_reason: booking.failure_reason,
            refunded: booking.refunded,
            created_at: booking.created_at,
        }
    }
}

/// Query parameters for listing a customer's bookings
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListBookingsQuery {
    /// Customer email the bookings are attributed to
    pub email: String,
}
