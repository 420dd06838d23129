//! In-process store backend.
//!
//! Holds slots and bookings in maps behind a single async mutex, so every
//! conditional update is linearizable: the compare and the swap happen under
//! one lock acquisition. Selected via `store.type = memory` in configuration;
//! also the backend the test suite runs against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::store::models::{Booking, BookingStatus, Slot, SlotStatus};
use crate::store::{BookingStore, Result, SlotGuard, SlotStore, StoreError};
use crate::types::{BookingId, SlotId, abbrev_uuid};

#[derive(Default)]
struct Tables {
    slots: HashMap<SlotId, Slot>,
    bookings: HashMap<BookingId, Booking>,
}

/// In-memory store with the same conditional-update semantics as the
/// PostgreSQL backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn insert_slot(&self, slot: &Slot) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.slots.insert(slot.id, slot.clone());
        Ok(())
    }

    async fn insert_slots(&self, slots: &[Slot]) -> Result<usize> {
        let mut tables = self.tables.lock().await;
        for slot in slots {
            tables.slots.insert(slot.id, slot.clone());
        }
        Ok(slots.len())
    }

    async fn slot(&self, id: SlotId) -> Result<Option<Slot>> {
        let tables = self.tables.lock().await;
        Ok(tables.slots.get(&id).cloned())
    }

    async fn list_slots(&self) -> Result<Vec<Slot>> {
        let tables = self.tables.lock().await;
        let mut slots: Vec<Slot> = tables.slots.values().cloned().collect();
        slots.sort_by_key(|slot| slot.start);
        Ok(slots)
    }

    async fn list_open_slots(&self) -> Result<Vec<Slot>> {
        let tables = self.tables.lock().await;
        let mut slots: Vec<Slot> = tables
            .slots
            .values()
            .filter(|slot| slot.status == SlotStatus::Available)
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.start);
        Ok(slots)
    }

    #[instrument(skip(self), fields(slot_id = %abbrev_uuid(&id)))]
    async fn reserve_slot(&self, id: SlotId, expires_at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.slots.get_mut(&id) {
            Some(slot) if slot.status == SlotStatus::Available => {
                slot.status = SlotStatus::Pending;
                slot.pending_expiry = Some(expires_at);
                slot.pending_session_id = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn attach_pending_session(&self, id: SlotId, session_id: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.slots.get_mut(&id) {
            Some(slot) if slot.status == SlotStatus::Pending => {
                slot.pending_session_id = Some(session_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    #[instrument(skip(self), fields(slot_id = %abbrev_uuid(&id)))]
    async fn release_slot(&self, id: SlotId) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(slot) = tables.slots.get_mut(&id) {
            slot.status = SlotStatus::Available;
            slot.pending_expiry = None;
            slot.pending_session_id = None;
        }
        Ok(())
    }

    #[instrument(skip(self, observed), fields(slot_id = %abbrev_uuid(&id)))]
    async fn book_slot(&self, id: SlotId, observed: &SlotGuard) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.slots.get_mut(&id) {
            Some(slot) if slot.status == observed.status && slot.pending_session_id == observed.pending_session_id => {
                slot.status = SlotStatus::Booked;
                slot.pending_expiry = None;
                slot.pending_session_id = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let mut reclaimed = 0;
        for slot in tables.slots.values_mut() {
            if slot.status == SlotStatus::Pending && slot.pending_expiry.is_some_and(|expiry| expiry <= now) {
                slot.status = SlotStatus::Available;
                slot.pending_expiry = None;
                slot.pending_session_id = None;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let duplicate = tables
            .bookings
            .values()
            .any(|existing| existing.external_payment_id == booking.external_payment_id);
        if duplicate {
            return Err(StoreError::Conflict {
                constraint: Some("bookings_external_payment_id_unique".to_string()),
                message: format!("booking for payment {} already exists", booking.external_payment_id),
            });
        }
        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables.bookings.get(&id).cloned())
    }

    async fn booking_by_payment_id(&self, external_payment_id: &str) -> Result<Option<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .find(|booking| booking.external_payment_id == external_payment_id)
            .cloned())
    }

    async fn bookings_for_email(&self, email: &str) -> Result<Vec<Booking>> {
        let tables = self.tables.lock().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|booking| booking.email == email)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn mark_refunded(&self, id: BookingId) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let booking = tables.bookings.get_mut(&id).ok_or(StoreError::NotFound)?;
        booking.refunded = true;
        Ok(())
    }

    async fn cancel_booking(&self, id: BookingId) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.bookings.get_mut(&id) {
            Some(booking) if booking.status == BookingStatus::Confirmed => {
                booking.status = BookingStatus::Cancelled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
