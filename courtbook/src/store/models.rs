//! Domain records persisted by the store: slots and bookings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::{BookingId, SlotId, UserId};

/// Fixed set of physical venues a lesson can take place at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    CentreCourt,
    EastCourts,
    IndoorArena,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::CentreCourt => "centre_court",
            Location::EastCourts => "east_courts",
            Location::IndoorArena => "indoor_arena",
        }
    }

    /// Human-readable venue name for checkout descriptions and emails.
    pub fn display_name(&self) -> &'static str {
        match self {
            Location::CentreCourt => "Centre Court",
            Location::EastCourts => "East Courts",
            Location::IndoorArena => "Indoor Arena",
        }
    }
}

impl FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "centre_court" => Ok(Location::CentreCourt),
            "east_courts" => Ok(Location::EastCourts),
            "indoor_arena" => Ok(Location::IndoorArena),
            other => Err(format!("unknown location: {other}")),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Lesson format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LessonCategory {
    Private,
    Group,
}

impl LessonCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonCategory::Private => "private",
            LessonCategory::Group => "group",
        }
    }
}

impl FromStr for LessonCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(LessonCategory::Private),
            "group" => Ok(LessonCategory::Group),
            other => Err(format!("unknown lesson category: {other}")),
        }
    }
}

impl fmt::Display for LessonCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Slot lifecycle state. A slot transitions `available -> pending -> booked`;
/// pending reservations lapse back to available when their TTL expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Pending,
    Booked,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Pending => "pending",
            SlotStatus::Booked => "booked",
        }
    }
}

impl FromStr for SlotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SlotStatus::Available),
            "pending" => Ok(SlotStatus::Pending),
            "booked" => Ok(SlotStatus::Booked),
            other => Err(format!("unknown slot status: {other}")),
        }
    }
}

/// A bookable lesson time window.
///
/// `pending_expiry` and `pending_session_id` are set together and cleared
/// together; both are absent unless the slot is pending. The session id is
/// only attached once the external checkout session exists, so a pending slot
/// may briefly carry an expiry without a session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub capacity: i32,
    /// Lesson price in major currency units (e.g. 40 = $40).
    pub price: i64,
    pub location: Location,
    pub category: LessonCategory,
    pub status: SlotStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pending_expiry: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pending_session_id: Option<String>,
}

/// Request to create a new slot. The store assigns the id.
#[derive(Debug, Clone)]
pub struct SlotCreate {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub capacity: i32,
    pub price: i64,
    pub location: Location,
    pub category: LessonCategory,
}

impl Slot {
    pub fn new(create: SlotCreate) -> Self {
        Self {
            id: Uuid::new_v4(),
            start: create.start,
            end: create.end,
            capacity: create.capacity,
            price: create.price,
            location: create.location,
            category: create.category,
            status: SlotStatus::Available,
            pending_expiry: None,
            pending_session_id: None,
        }
    }

    /// Whether a pending reservation on this slot has lapsed at `now`.
    pub fn pending_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SlotStatus::Pending && self.pending_expiry.is_some_and(|expiry| expiry <= now)
    }
}

/// Outcome of a completed or failed payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Failed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Failed => "failed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "failed" => Ok(BookingStatus::Failed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// The customer a checkout attempt is attributed to. Guest checkout carries
/// only an email address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Customer {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<UserId>,
    pub email: String,
}

/// Slot fields copied onto a booking at creation time, independent of
/// subsequent slot mutation. Absent when the slot record could not be read at
/// reconciliation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Location,
    pub category: LessonCategory,
    pub price: i64,
}

impl From<&Slot> for SlotSnapshot {
    fn from(slot: &Slot) -> Self {
        Self {
            start: slot.start,
            end: slot.end,
            location: slot.location,
            category: slot.category,
            price: slot.price,
        }
    }
}

/// Durable record of a payment outcome, written exactly once per checkout
/// attempt by the webhook reconciler and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub slot_id: SlotId,
    pub snapshot: Option<SlotSnapshot>,
    pub status: BookingStatus,
    /// External checkout-session identifier; unique across bookings.
    pub external_payment_id: String,
    pub user_id: Option<UserId>,
    pub email: String,
    pub failure_reason: Option<String>,
    pub refunded: bool,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Build a confirmed booking from the slot being finalized.
    pub fn confirmed(slot: &Slot, external_payment_id: &str, customer: &Customer) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_id: slot.id,
            snapshot: Some(SlotSnapshot::from(slot)),
            status: BookingStatus::Confirmed,
            external_payment_id: external_payment_id.to_string(),
            user_id: customer.user_id,
            email: customer.email.clone(),
            failure_reason: None,
            refunded: false,
            created_at: Utc::now(),
        }
    }

    /// Build a failed booking for a rejected checkout attempt. The snapshot is
    /// absent when the slot record was missing or unreadable.
    pub fn failed(
        slot_id: SlotId,
        snapshot: Option<SlotSnapshot>,
        external_payment_id: &str,
        customer: &Customer,
        reason: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_id,
            snapshot,
            status: BookingStatus::Failed,
            external_payment_id: external_payment_id.to_string(),
            user_id: customer.user_id,
            email: customer.email.clone(),
            failure_reason: Some(reason.to_string()),
            refunded: false,
            created_at: Utc::now(),
        }
    }
}
