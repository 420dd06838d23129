//! Request and response DTOs for the HTTP API.

pub mod bookings;
pub mod checkout;
pub mod slots;
