//! Checkout orchestration: reserve a slot, create the hosted payment
//! session, and hand the customer a redirect URL.

use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

use crate::booking::reservation::ReservationManager;
use crate::errors::{Error, Result};
use crate::payment_providers::PaymentProvider;
use crate::store::Store;
use crate::store::models::{Customer, Slot, SlotStatus};
use crate::types::{SlotId, abbrev_uuid};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};

/// Encode a slot snapshot for the success-redirect query string:
/// base64 of the slot's JSON, percent-escaped.
///
/// The confirmation page decodes this to render the booked lesson without a
/// round trip while it polls for the booking record.
pub fn encode_slot_param(slot: &Slot) -> Result<String> {
    let json = serde_json::to_string(slot).map_err(|e| Error::Other(anyhow::anyhow!("Failed to serialize slot: {e}")))?;
    let encoded = BASE64_STANDARD.encode(json);
    Ok(url::form_urlencoded::byte_serialize(encoded.as_bytes()).collect())
}

/// Decode the success-redirect slot parameter back into a slot snapshot.
pub fn decode_slot_param(param: &str) -> Result<Slot> {
    let bad = |message: String| Error::BadRequest { message };
    let decoded: String = url::form_urlencoded::parse(format!("v={param}").as_bytes())
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| bad("Invalid slot parameter".to_string()))?;
    let json = BASE64_STANDARD
        .decode(decoded.as_bytes())
        .map_err(|e| bad(format!("Invalid slot parameter encoding: {e}")))?;
    serde_json::from_slice(&json).map_err(|e| bad(format!("Invalid slot parameter payload: {e}")))
}

/// The one reserve-and-pay implementation, shared by every surface that
/// starts a checkout.
#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Store>,
    payments: Arc<dyn PaymentProvider>,
    reservations: ReservationManager,
    public_url: String,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn Store>,
        payments: Arc<dyn PaymentProvider>,
        reservations: ReservationManager,
        public_url: String,
    ) -> Self {
        Self {
            store,
            payments,
            reservations,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Reserve `slot_id` for `customer` and create the hosted payment
    /// session. Returns the URL to redirect the customer to.
    ///
    /// Ordering matters: the slot is reserved locally before the external
    /// session exists, so a slot is never externally payable without being
    /// locked first. The session id is attached afterwards because the
    /// provider assigns it at creation time.
    #[instrument(skip(self, customer), fields(slot_id = %abbrev_uuid(&slot_id), email = %customer.email))]
    pub async fn begin(&self, slot_id: SlotId, customer: &Customer) -> Result<String> {
        // Precondition check before any side effect. The conditional write in
        // reserve() is the authoritative race arbiter; this read just gives
        // earlier, cheaper rejections and validates the slot's pricing.
        let Some(slot) = self.store.slot(slot_id).await? else {
            return Err(Error::SlotUnavailable { slot_id });
        };
        if slot.status != SlotStatus::Available {
            return Err(Error::SlotUnavailable { slot_id });
        }
        if slot.price <= 0 || slot.capacity <= 0 {
            return Err(Error::BadRequest {
                message: format!("Slot {slot_id} has no payable price or capacity"),
            });
        }

        let reserved = self.reservations.reserve(slot_id).await?;
        let expires_at = reserved.pending_expiry.unwrap_or_else(Utc::now);

        let success_url = format!(
            "{}/confirmation?slot={}&session_id={{CHECKOUT_SESSION_ID}}",
            self.public_url,
            encode_slot_param(&reserved)?,
        );
        let cancel_url = format!("{}/api/v1/checkout/cancel?slot_id={}", self.public_url, slot_id);

        let checkout = match self
            .payments
            .create_checkout_session(&reserved, customer, &success_url, &cancel_url, expires_at)
            .await
        {
            Ok(checkout) => checkout,
            Err(e) => {
                // Undo the reservation rather than leaving the slot locked
                // until the sweep reclaims it.
                if let Err(release_err) = self.reservations.release(slot_id).await {
                    tracing::error!("Failed to release slot after session creation error: {:#}", release_err);
                }
                return Err(e.into());
            }
        };

        self.reservations.attach_session(slot_id, &checkout.session_id).await?;

        tracing::info!(session_id = %checkout.session_id, "Checkout session created");
        Ok(checkout.url)
    }
}
