//! HTTP request handlers.

pub mod bookings;
pub mod checkout;
pub mod slots;
pub mod webhooks;
