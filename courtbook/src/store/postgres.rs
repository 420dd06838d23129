//! PostgreSQL store backend.
//!
//! Conditional updates are expressed as guarded `UPDATE ... WHERE` statements
//! and decided by `rows_affected`, so the compare-and-swap happens inside the
//! database rather than in application code. Status enums are persisted as
//! text; rows that fail to decode surface as [`StoreError::Corrupt`] so the
//! reconciler can treat them as unreadable rather than as transport failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;

use crate::store::models::{Booking, Slot, SlotSnapshot};
use crate::store::{BookingStore, Result, SlotGuard, SlotStore, StoreError};
use crate::types::{BookingId, SlotId, UserId, abbrev_uuid};

/// Store backend over a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SlotRow {
    id: SlotId,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    capacity: i32,
    price: i64,
    location: String,
    category: String,
    status: String,
    pending_expiry: Option<DateTime<Utc>>,
    pending_session_id: Option<String>,
}

impl TryFrom<SlotRow> for Slot {
    type Error = StoreError;

    fn try_from(row: SlotRow) -> Result<Self> {
        let corrupt = |message: String| StoreError::Corrupt { message };
        Ok(Slot {
            id: row.id,
            start: row.start_at,
            end: row.end_at,
            capacity: row.capacity,
            price: row.price,
            location: row.location.parse().map_err(corrupt)?,
            category: row.category.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            pending_expiry: row.pending_expiry,
            pending_session_id: row.pending_session_id,
        })
    }
}

#[derive(Debug, FromRow)]
struct BookingRow {
    id: BookingId,
    slot_id: SlotId,
    start_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
    location: Option<String>,
    category: Option<String>,
    price: Option<i64>,
    status: String,
    external_payment_id: String,
    user_id: Option<UserId>,
    email: String,
    failure_reason: Option<String>,
    refunded: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self> {
        let corrupt = |message: String| StoreError::Corrupt { message };
        // A snapshot only counts when every copied slot field survived
        let snapshot = match (row.start_at, row.end_at, row.location, row.category, row.price) {
            (Some(start), Some(end), Some(location), Some(category), Some(price)) => Some(SlotSnapshot {
                start,
                end,
                location: location.parse().map_err(corrupt)?,
                category: category.parse().map_err(corrupt)?,
                price,
            }),
            _ => None,
        };
        Ok(Booking {
            id: row.id,
            slot_id: row.slot_id,
            snapshot,
            status: row.status.parse().map_err(corrupt)?,
            external_payment_id: row.external_payment_id,
            user_id: row.user_id,
            email: row.email,
            failure_reason: row.failure_reason,
            refunded: row.refunded,
            created_at: row.created_at,
        })
    }
}

const SLOT_COLUMNS: &str = "id, start_at, end_at, capacity, price, location, category, status, pending_expiry, pending_session_id";

const BOOKING_COLUMNS: &str = "id, slot_id, start_at, end_at, location, category, price, status, external_payment_id, user_id, email, failure_reason, refunded, created_at";

#[async_trait]
impl SlotStore for PgStore {
    #[instrument(skip_all, fields(slot_id = %abbrev_uuid(&slot.id)), err)]
    async fn insert_slot(&self, slot: &Slot) -> Result<()> {
        sqlx::query(
            "INSERT INTO slots (id, start_at, end_at, capacity, price, location, category, status, pending_expiry, pending_session_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(slot.id)
        .bind(slot.start)
        .bind(slot.end)
        .bind(slot.capacity)
        .bind(slot.price)
        .bind(slot.location.as_str())
        .bind(slot.category.as_str())
        .bind(slot.status.as_str())
        .bind(slot.pending_expiry)
        .bind(slot.pending_session_id.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(count = slots.len()), err)]
    async fn insert_slots(&self, slots: &[Slot]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for slot in slots {
            sqlx::query(
                "INSERT INTO slots (id, start_at, end_at, capacity, price, location, category, status, pending_expiry, pending_session_id)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(slot.id)
            .bind(slot.start)
            .bind(slot.end)
            .bind(slot.capacity)
            .bind(slot.price)
            .bind(slot.location.as_str())
            .bind(slot.category.as_str())
            .bind(slot.status.as_str())
            .bind(slot.pending_expiry)
            .bind(slot.pending_session_id.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(slots.len())
    }

    async fn slot(&self, id: SlotId) -> Result<Option<Slot>> {
        let row: Option<SlotRow> = sqlx::query_as(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Slot::try_from).transpose()
    }

    async fn list_slots(&self) -> Result<Vec<Slot>> {
        let rows: Vec<SlotRow> = sqlx::query_as(&format!("SELECT {SLOT_COLUMNS} FROM slots ORDER BY start_at"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Slot::try_from).collect()
    }

    async fn list_open_slots(&self) -> Result<Vec<Slot>> {
        let rows: Vec<SlotRow> =
            sqlx::query_as(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE status = 'available' ORDER BY start_at"))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Slot::try_from).collect()
    }

    #[instrument(skip(self), fields(slot_id = %abbrev_uuid(&id)), err)]
    async fn reserve_slot(&self, id: SlotId, expires_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE slots
             SET status = 'pending', pending_expiry = $2, pending_session_id = NULL
             WHERE id = $1 AND status = 'available'",
        )
        .bind(id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn attach_pending_session(&self, id: SlotId, session_id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE slots SET pending_session_id = $2 WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(slot_id = %abbrev_uuid(&id)), err)]
    async fn release_slot(&self, id: SlotId) -> Result<()> {
        sqlx::query("UPDATE slots SET status = 'available', pending_expiry = NULL, pending_session_id = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, observed), fields(slot_id = %abbrev_uuid(&id)), err)]
    async fn book_slot(&self, id: SlotId, observed: &SlotGuard) -> Result<bool> {
        // IS NOT DISTINCT FROM makes NULL compare equal to NULL, so a guard
        // taken before the session id was attached stays honest.
        let result = sqlx::query(
            "UPDATE slots
             SET status = 'booked', pending_expiry = NULL, pending_session_id = NULL
             WHERE id = $1 AND status = $2 AND pending_session_id IS NOT DISTINCT FROM $3",
        )
        .bind(id)
        .bind(observed.status.as_str())
        .bind(observed.pending_session_id.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE slots
             SET status = 'available', pending_expiry = NULL, pending_session_id = NULL
             WHERE status = 'pending' AND pending_expiry <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    #[instrument(skip_all, fields(booking_id = %abbrev_uuid(&booking.id), payment_id = %booking.external_payment_id), err)]
    async fn insert_booking(&self, booking: &Booking) -> Result<()> {
        let snapshot = booking.snapshot.as_ref();
        sqlx::query(
            "INSERT INTO bookings (id, slot_id, start_at, end_at, location, category, price, status, external_payment_id, user_id, email, failure_reason, refunded, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(booking.id)
        .bind(booking.slot_id)
        .bind(snapshot.map(|s| s.start))
        .bind(snapshot.map(|s| s.end))
        .bind(snapshot.map(|s| s.location.as_str()))
        .bind(snapshot.map(|s| s.category.as_str()))
        .bind(snapshot.map(|s| s.price))
        .bind(booking.status.as_str())
        .bind(&booking.external_payment_id)
        .bind(booking.user_id)
        .bind(&booking.email)
        .bind(booking.failure_reason.as_deref())
        .bind(booking.refunded)
        .bind(booking.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn booking_by_payment_id(&self, external_payment_id: &str) -> Result<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE external_payment_id = $1"))
                .bind(external_payment_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn bookings_for_email(&self, email: &str) -> Result<Vec<Booking>> {
        let rows: Vec<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE email = $1 ORDER BY created_at DESC"))
                .bind(email)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn mark_refunded(&self, id: BookingId) -> Result<()> {
        let result = sqlx::query("UPDATE bookings SET refunded = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id)), err)]
    async fn cancel_booking(&self, id: BookingId) -> Result<bool> {
        let result = sqlx::query("UPDATE bookings SET status = 'cancelled' WHERE id = $1 AND status = 'confirmed'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
