//! OpenAPI documentation for the HTTP API, served at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::models::{
    bookings::BookingResponse,
    checkout::{CheckoutRequest, CheckoutResponse},
    slots::{GenerateSlotsRequest, GenerateSlotsResponse, SlotCreateRequest, SlotResponse},
};
use crate::store::models::{BookingStatus, Customer, LessonCategory, Location, SlotStatus};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "courtbook",
        description = "Tennis lesson booking API: slot availability, checkout, and payment reconciliation"
    ),
    paths(
        crate::api::handlers::slots::list_slots,
        crate::api::handlers::slots::create_slot,
        crate::api::handlers::slots::generate_slots,
        crate::api::handlers::checkout::create_checkout,
        crate::api::handlers::checkout::cancel_checkout,
        crate::api::handlers::bookings::get_booking_by_session,
        crate::api::handlers::bookings::list_bookings,
        crate::api::handlers::bookings::cancel_booking,
        crate::api::handlers::webhooks::payment_webhook,
    ),
    components(schemas(
        SlotResponse,
        SlotCreateRequest,
        GenerateSlotsRequest,
        GenerateSlotsResponse,
        CheckoutRequest,
        CheckoutResponse,
        BookingResponse,
        Customer,
        Location,
        LessonCategory,
        SlotStatus,
        BookingStatus,
    )),
    modifiers(&AdminSecurityAddon),
    tags(
        (name = "slots", description = "Slot listing and admin slot management"),
        (name = "checkout", description = "Reservation and hosted payment flow"),
        (name = "bookings", description = "Booking lookups and cancellation"),
        (name = "webhooks", description = "Payment provider callbacks"),
    )
)]
pub struct ApiDoc;

struct AdminSecurityAddon;

impl Modify for AdminSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "AdminBearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
