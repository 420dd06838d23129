//! Persistence layer for slots and bookings.
//!
//! The store is a narrow seam: handlers and the booking workflow only ever
//! read a record by id, list, and perform conditional updates. Two backends
//! implement it:
//!
//! - [`postgres::PgStore`]: sqlx/PostgreSQL, for production deployments
//! - [`memory::MemoryStore`]: in-process, for development and tests
//!
//! # Conditional updates
//!
//! The slot record is the single point of mutual exclusion for the booking
//! workflow. Every state transition on the booking path is a compare-and-swap
//! guarded on the previously observed status (and, for finalization, the
//! observed pending session id). A plain read-then-write is never used for
//! those transitions; callers must treat a `false` return as losing the race
//! and re-read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{BookingId, SlotId};

pub mod memory;
pub mod models;
pub mod postgres;

use models::{Booking, Slot, SlotStatus};

/// Unified error type for store operations that application code can handle
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record not found by the given identifier
    #[error("record not found")]
    NotFound,

    /// Unique constraint violation
    #[error("unique constraint violation: {message}")]
    Conflict {
        constraint: Option<String>,
        message: String,
    },

    /// A record exists but its fields could not be decoded
    #[error("corrupt record: {message}")]
    Corrupt { message: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convert from sqlx::Error using sqlx error categorization
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Corrupt {
                message: err.to_string(),
            },
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Conflict {
                constraint: db_err.constraint().map(|s| s.to_string()),
                message: db_err.message().to_string(),
            },
            _ => StoreError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Type alias for store operation results
pub type Result<T> = std::result::Result<T, StoreError>;

/// The slot state a caller observed before requesting a conditional write.
/// [`SlotStore::book_slot`] only succeeds if the record still matches.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotGuard {
    pub status: SlotStatus,
    pub pending_session_id: Option<String>,
}

impl From<&Slot> for SlotGuard {
    fn from(slot: &Slot) -> Self {
        Self {
            status: slot.status,
            pending_session_id: slot.pending_session_id.clone(),
        }
    }
}

/// Slot persistence operations.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Insert a single slot.
    async fn insert_slot(&self, slot: &Slot) -> Result<()>;

    /// Insert a batch of slots, returning how many were written.
    async fn insert_slots(&self, slots: &[Slot]) -> Result<usize>;

    /// Read a slot by id.
    async fn slot(&self, id: SlotId) -> Result<Option<Slot>>;

    /// List every slot, newest start time first.
    async fn list_slots(&self) -> Result<Vec<Slot>>;

    /// List slots currently offerable to customers (status = available).
    async fn list_open_slots(&self) -> Result<Vec<Slot>>;

    /// Conditionally transition an available slot to pending with the given
    /// reservation expiry. Returns false if the slot is missing or not
    /// available (the caller lost the race).
    async fn reserve_slot(&self, id: SlotId, expires_at: DateTime<Utc>) -> Result<bool>;

    /// Attach the external checkout-session id to a pending reservation.
    /// Returns false if the slot is no longer pending.
    async fn attach_pending_session(&self, id: SlotId, session_id: &str) -> Result<bool>;

    /// Unconditionally reset a slot to available, clearing both pending
    /// fields. Used by the cancel path and the expiration sweep.
    async fn release_slot(&self, id: SlotId) -> Result<()>;

    /// Conditionally transition a slot to booked, guarded on the observed
    /// state. Clears both pending fields. Returns false on guard mismatch.
    async fn book_slot(&self, id: SlotId, observed: &SlotGuard) -> Result<bool>;

    /// Release every pending slot whose reservation expiry is at or before
    /// `now`. Returns the number of slots reclaimed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Booking persistence operations.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert a booking. Fails with [`StoreError::Conflict`] when a booking
    /// for the same external payment id already exists; callers rely on this
    /// for webhook idempotency.
    async fn insert_booking(&self, booking: &Booking) -> Result<()>;

    /// Read a booking by id.
    async fn booking(&self, id: BookingId) -> Result<Option<Booking>>;

    /// Read a booking by its external checkout-session id.
    async fn booking_by_payment_id(&self, external_payment_id: &str) -> Result<Option<Booking>>;

    /// List bookings attributed to a customer email, newest first.
    async fn bookings_for_email(&self, email: &str) -> Result<Vec<Booking>>;

    /// Record that a failed booking's payment was refunded.
    async fn mark_refunded(&self, id: BookingId) -> Result<()>;

    /// Conditionally transition a confirmed booking to cancelled. Returns
    /// false if the booking is missing or not confirmed.
    async fn cancel_booking(&self, id: BookingId) -> Result<bool>;
}

/// The full persistence seam handed to handlers and services.
pub trait Store: SlotStore + BookingStore {}

impl<T: SlotStore + BookingStore> Store for T {}
