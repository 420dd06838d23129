//! Reservation manager: holds a slot for one customer while they pay.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::instrument;

use crate::errors::{Error, Result};
use crate::store::Store;
use crate::store::models::{Slot, SlotStatus};
use crate::types::{SlotId, abbrev_uuid};

/// Transitions slots between available and pending on behalf of the checkout
/// flow. All transitions go through the store's conditional updates; losing a
/// race surfaces as [`Error::SlotUnavailable`].
#[derive(Clone)]
pub struct ReservationManager {
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl ReservationManager {
    pub fn new(store: Arc<dyn Store>, ttl: std::time::Duration) -> Self {
        Self {
            store,
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::minutes(30)),
        }
    }

    /// Atomically reserve an available slot.
    ///
    /// On success the slot is pending with a fresh expiry and no session id
    /// yet; the checkout service attaches the session id once the external
    /// session exists (its id is only known after creation, which itself
    /// needs the slot reserved first).
    #[instrument(skip(self), fields(slot_id = %abbrev_uuid(&slot_id)))]
    pub async fn reserve(&self, slot_id: SlotId) -> Result<Slot> {
        let Some(slot) = self.store.slot(slot_id).await? else {
            tracing::debug!("Reserve requested for unknown slot");
            return Err(Error::SlotUnavailable { slot_id });
        };

        if slot.status != SlotStatus::Available {
            tracing::debug!(status = slot.status.as_str(), "Reserve requested for non-available slot");
            return Err(Error::SlotUnavailable { slot_id });
        }

        let expires_at = Utc::now() + self.ttl;
        if !self.store.reserve_slot(slot_id, expires_at).await? {
            // Someone else won between our read and the conditional write
            tracing::debug!("Lost reservation race");
            return Err(Error::SlotUnavailable { slot_id });
        }

        tracing::info!(expires_at = %expires_at, "Reserved slot");

        Ok(Slot {
            status: SlotStatus::Pending,
            pending_expiry: Some(expires_at),
            pending_session_id: None,
            ..slot
        })
    }

    /// Attach the external checkout-session id to a pending reservation.
    pub async fn attach_session(&self, slot_id: SlotId, session_id: &str) -> Result<()> {
        if !self.store.attach_pending_session(slot_id, session_id).await? {
            // The reservation was swept or released while the external
            // session was being created; the reconciler's re-check at
            // finalize time keeps this safe.
            tracing::warn!(
                slot_id = %abbrev_uuid(&slot_id),
                session_id,
                "Could not attach session id, reservation no longer pending"
            );
        }
        Ok(())
    }

    /// Unconditionally release a slot back to available.
    ///
    /// Called when the customer abandons checkout via the cancel URL, when
    /// session creation fails after the reserve step, and by the expiration
    /// sweep.
    #[instrument(skip(self), fields(slot_id = %abbrev_uuid(&slot_id)))]
    pub async fn release(&self, slot_id: SlotId) -> Result<()> {
        self.store.release_slot(slot_id).await?;
        tracing::info!("Released slot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SlotStore;
    use crate::store::memory::MemoryStore;
    use crate::store::models::{LessonCategory, Location, SlotCreate};
    use chrono::TimeZone;

    fn manager_with_store() -> (ReservationManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let manager = ReservationManager::new(store.clone(), std::time::Duration::from_secs(30 * 60));
        (manager, store)
    }

    async fn seeded_slot(store: &MemoryStore) -> Slot {
        let slot = Slot::new(SlotCreate {
            start: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(),
            capacity: 1,
            price: 40,
            location: Location::CentreCourt,
            category: LessonCategory::Private,
        });
        store.insert_slot(&slot).await.unwrap();
        slot
    }

    #[tokio::test]
    async fn test_reserve_sets_pending_with_ttl() {
        let (manager, store) = manager_with_store();
        let slot = seeded_slot(&store).await;

        let before = Utc::now();
        let reserved = manager.reserve(slot.id).await.unwrap();

        assert_eq!(reserved.status, SlotStatus::Pending);
        let expiry = reserved.pending_expiry.unwrap();
        assert!(expiry >= before + Duration::minutes(29));
        assert!(expiry <= Utc::now() + Duration::minutes(31));
        assert!(reserved.pending_session_id.is_none());
    }

    #[tokio::test]
    async fn test_reserve_unknown_slot_fails() {
        let (manager, _store) = manager_with_store();
        let err = manager.reserve(uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::SlotUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_reserve_pending_slot_fails_without_mutation() {
        let (manager, store) = manager_with_store();
        let slot = seeded_slot(&store).await;

        let first = manager.reserve(slot.id).await.unwrap();
        let err = manager.reserve(slot.id).await.unwrap_err();
        assert!(matches!(err, Error::SlotUnavailable { .. }));

        // The losing attempt must not have touched the reservation
        let stored = store.slot(slot.id).await.unwrap().unwrap();
        assert_eq!(stored.pending_expiry, first.pending_expiry);
    }

    #[tokio::test]
    async fn test_release_then_reserve_again() {
        let (manager, store) = manager_with_store();
        let slot = seeded_slot(&store).await;

        manager.reserve(slot.id).await.unwrap();
        manager.release(slot.id).await.unwrap();

        // A fresh reservation succeeds after release
        let reserved = manager.reserve(slot.id).await.unwrap();
        assert_eq!(reserved.status, SlotStatus::Pending);
    }

    #[tokio::test]
    async fn test_attach_session_on_released_slot_is_harmless() {
        let (manager, store) = manager_with_store();
        let slot = seeded_slot(&store).await;

        manager.reserve(slot.id).await.unwrap();
        manager.release(slot.id).await.unwrap();

        // Attach after release logs and moves on; the slot stays clean
        manager.attach_session(slot.id, "cs_1").await.unwrap();
        let stored = store.slot(slot.id).await.unwrap().unwrap();
        assert!(stored.pending_session_id.is_none());
        assert_eq!(stored.status, SlotStatus::Available);
    }
}
