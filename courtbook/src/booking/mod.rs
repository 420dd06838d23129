//! The booking workflow: reservation, checkout orchestration, and webhook
//! reconciliation.
//!
//! This is the one implementation of the reserve-and-pay logic; every surface
//! (the checkout endpoint, the cancel redirect, the webhook endpoint) goes
//! through it rather than carrying its own copy.
//!
//! # Control flow
//!
//! 1. A customer picks a slot. [`checkout::CheckoutService`] re-checks
//!    availability, reserves the slot through
//!    [`reservation::ReservationManager`] (a conditional write, so concurrent
//!    customers cannot both win), creates a hosted checkout session with the
//!    payment provider, and attaches the session id to the reservation.
//! 2. The customer pays (or abandons). Abandoning to the cancel URL releases
//!    the reservation; otherwise it lapses after the TTL and the next slot
//!    listing sweeps it.
//! 3. The provider delivers a completion event.
//!    [`reconciler::Reconciler`] re-reads the slot and either finalizes the
//!    booking or refunds and records the failure.

pub mod checkout;
pub mod reconciler;
pub mod reservation;
