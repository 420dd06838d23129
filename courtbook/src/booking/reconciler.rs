//! Webhook reconciler: turns asynchronous payment-completion events into
//! booking outcomes.
//!
//! Payment completion arrives out of order with respect to local slot state
//! and may be delivered more than once. The reconciler re-reads the slot on
//! every delivery and decides, under the store's conditional-update
//! semantics, whether to finalize the booking or refund and reject it.
//!
//! Idempotency hangs on two mechanisms:
//! - a booking already recorded under the incoming session id short-circuits
//!   the whole state machine (duplicate deliveries are no-ops);
//! - the unique constraint on `external_payment_id` arbitrates concurrent
//!   duplicate deliveries that race past the first check.

use std::sync::Arc;
use tracing::instrument;

use crate::cache::BookingCache;
use crate::errors::{Error, Result};
use crate::payment_providers::{CompletedCheckout, PaymentProvider};
use crate::store::models::{Booking, BookingStatus, Slot, SlotSnapshot, SlotStatus};
use crate::store::{SlotGuard, Store, StoreError};
use crate::types::{SlotId, abbrev_uuid};

/// What processing a completion event amounted to.
#[derive(Debug)]
pub enum Outcome {
    /// The slot was booked and a confirmed booking written.
    Confirmed(Booking),
    /// A previous delivery already settled this session; nothing was done.
    AlreadyProcessed(Booking),
    /// The slot could not be honored; the payment was refunded and a failed
    /// booking recorded.
    Rejected(Booking),
}

impl Outcome {
    pub fn booking(&self) -> &Booking {
        match self {
            Outcome::Confirmed(booking) | Outcome::AlreadyProcessed(booking) | Outcome::Rejected(booking) => booking,
        }
    }
}

/// How many times a lost finalize race is retried with fresh slot state
/// before giving up. Contention on a single slot is short-lived, so a small
/// bound suffices.
const FINALIZE_RETRIES: usize = 3;

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    payments: Arc<dyn PaymentProvider>,
    cache: BookingCache,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, payments: Arc<dyn PaymentProvider>, cache: BookingCache) -> Self {
        Self { store, payments, cache }
    }

    /// Process a verified payment-completion event for `slot_id`.
    ///
    /// By the time this runs the customer's money has moved, so any
    /// unexpected failure triggers a best-effort refund before the error is
    /// surfaced (and the resulting 500 makes the provider redeliver).
    #[instrument(skip_all, fields(session_id = %event.session_id, slot_id = %abbrev_uuid(&slot_id)))]
    pub async fn process_completed_checkout(&self, event: &CompletedCheckout, slot_id: SlotId) -> Result<Outcome> {
        match self.reconcile(event, slot_id).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                // Safety net: the provider has taken payment, so try to give
                // it back before reporting the failure. A refund failure is
                // logged but never masks the original error.
                tracing::error!("Unexpected error while reconciling paid session: {:#}", error);
                if let Err(refund_err) = self.payments.refund(&event.session_id).await {
                    tracing::error!("Best-effort refund also failed: {:#}", refund_err);
                }
                Err(error)
            }
        }
    }

    async fn reconcile(&self, event: &CompletedCheckout, slot_id: SlotId) -> Result<Outcome> {
        // Fast path: this session was already settled by a previous delivery.
        if let Some(existing) = self.store.booking_by_payment_id(&event.session_id).await? {
            return Ok(self.settle_duplicate(existing).await?);
        }

        for attempt in 0..FINALIZE_RETRIES {
            // Re-read the slot fresh on every attempt; the observed state is
            // the guard for the conditional booked transition.
            let slot = match self.store.slot(slot_id).await {
                Ok(slot) => slot,
                Err(StoreError::Corrupt { message }) => {
                    tracing::warn!("Slot record unreadable at reconcile time: {message}");
                    return self.reject(event, slot_id, None, "slot data missing").await;
                }
                Err(other) => return Err(other.into()),
            };

            let Some(slot) = slot else {
                return self.reject(event, slot_id, None, "slot no longer exists").await;
            };

            let snapshot = Some(SlotSnapshot::from(&slot));
            let same_session = slot.pending_session_id.as_deref() == Some(event.session_id.as_str());

            match slot.status {
                SlotStatus::Booked => {
                    // A true duplicate of an already-finalized session is
                    // caught by the fast path; reaching here means another
                    // session won the slot.
                    return self.reject(event, slot_id, snapshot, "booked by someone else").await;
                }
                SlotStatus::Pending if !same_session && !slot.pending_expired(chrono::Utc::now()) => {
                    return self.reject(event, slot_id, snapshot, "pending for another player").await;
                }
                // Matching session, expired reservation, or a slot that has
                // lapsed back to available: the payment wins the slot.
                SlotStatus::Pending | SlotStatus::Available => {
                    let guard = SlotGuard::from(&slot);
                    if self.store.book_slot(slot_id, &guard).await? {
                        return self.finalize(event, &slot).await;
                    }
                    // Lost the race against a concurrent reserve, sweep, or
                    // competing webhook; re-read and decide again.
                    tracing::debug!(attempt, "Finalize guard mismatch, retrying with fresh slot state");
                }
            }
        }

        Err(Error::Other(anyhow::anyhow!(
            "Could not settle session {} for slot {slot_id}: slot state kept changing",
            event.session_id
        )))
    }

    /// A booking for this session already exists. Confirmed and cancelled
    /// bookings are plain no-ops; a failed booking whose refund never went
    /// through gets one more refund attempt.
    async fn settle_duplicate(&self, existing: Booking) -> Result<Outcome> {
        tracing::info!(
            booking_id = %abbrev_uuid(&existing.id),
            status = existing.status.as_str(),
            "Duplicate delivery for settled session"
        );

        if existing.status == BookingStatus::Failed && !existing.refunded {
            match self.payments.refund(&existing.external_payment_id).await {
                Ok(()) => {
                    self.store.mark_refunded(existing.id).await?;
                    return Ok(Outcome::AlreadyProcessed(Booking {
                        refunded: true,
                        ..existing
                    }));
                }
                Err(e) => tracing::error!("Retried refund failed: {:#}", e),
            }
        }

        Ok(Outcome::AlreadyProcessed(existing))
    }

    /// Write the confirmed booking for a slot we just transitioned to booked.
    async fn finalize(&self, event: &CompletedCheckout, slot: &Slot) -> Result<Outcome> {
        let booking = Booking::confirmed(slot, &event.session_id, &event.customer);

        match self.store.insert_booking(&booking).await {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                // A concurrent duplicate delivery settled this session first;
                // defer to its booking.
                let existing = self
                    .store
                    .booking_by_payment_id(&event.session_id)
                    .await?
                    .ok_or_else(|| Error::Other(anyhow::anyhow!("Conflict on insert but no booking found for session")))?;
                if existing.status != BookingStatus::Confirmed {
                    // The duplicate read the slot as booked in the window
                    // between our slot write and this insert, so it rejected
                    // and refunded the payment. The sale is void; give the
                    // hour back.
                    tracing::warn!("Session was rejected concurrently, reopening slot");
                    self.store.release_slot(slot.id).await?;
                }
                return Ok(Outcome::AlreadyProcessed(existing));
            }
            Err(other) => {
                // The slot is booked but no booking record exists. Reopen the
                // slot so the failed attempt doesn't strand the hour; the
                // outer safety net refunds.
                if let Err(release_err) = self.store.release_slot(slot.id).await {
                    tracing::error!("Failed to reopen slot after booking write failure: {:#}", release_err);
                }
                return Err(other.into());
            }
        }

        self.cache.invalidate(&event.customer.email).await;

        tracing::info!(booking_id = %abbrev_uuid(&booking.id), "Booking confirmed");
        Ok(Outcome::Confirmed(booking))
    }

    /// Record the rejection, then refund.
    ///
    /// The failed booking is written first: its unique session id claims the
    /// event, so a concurrent duplicate cannot trigger a second refund. The
    /// slot itself is left untouched on every rejection path.
    async fn reject(&self, event: &CompletedCheckout, slot_id: SlotId, snapshot: Option<SlotSnapshot>, reason: &str) -> Result<Outcome> {
        tracing::warn!(reason, "Rejecting paid session");

        let mut booking = Booking::failed(slot_id, snapshot, &event.session_id, &event.customer, reason);

        match self.store.insert_booking(&booking).await {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                let existing = self
                    .store
                    .booking_by_payment_id(&event.session_id)
                    .await?
                    .ok_or_else(|| Error::Other(anyhow::anyhow!("Conflict on insert but no booking found for session")))?;
                return Ok(Outcome::AlreadyProcessed(existing));
            }
            Err(other) => return Err(other.into()),
        }

        match self.payments.refund(&event.session_id).await {
            Ok(()) => {
                self.store.mark_refunded(booking.id).await?;
                booking.refunded = true;
            }
            Err(e) => {
                // Leave refunded = false; a redelivery retries the refund via
                // settle_duplicate.
                tracing::error!("Refund failed for rejected session: {:#}", e);
            }
        }

        self.cache.invalidate(&event.customer.email).await;

        Ok(Outcome::Rejected(booking))
    }
}
