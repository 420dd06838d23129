//! End-to-end tests over the HTTP surface: the full reserve, pay, reconcile
//! workflow against the in-memory store and the dummy payment provider.

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use crate::store::models::{BookingStatus, SlotStatus};
use crate::store::{BookingStore, SlotStore};
use crate::test_utils::*;

fn checkout_body(slot_id: crate::SlotId) -> Value {
    json!({
        "slot_id": slot_id,
        "email": "guest@example.com",
    })
}

/// Drive a slot through checkout and return the session id the provider
/// assigned to it.
async fn start_checkout(app: &TestApp, slot_id: crate::SlotId) -> String {
    let response = app.server.post("/api/v1/checkout").json(&checkout_body(slot_id)).await;
    response.assert_status_ok();

    let slot = app.store.slot(slot_id).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Pending);
    slot.pending_session_id.expect("session id should be attached")
}

#[test_log::test(tokio::test)]
async fn test_healthz() {
    let app = create_test_app();
    let response = app.server.get("/healthz").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "OK");
}

#[test_log::test(tokio::test)]
async fn test_full_booking_flow() {
    let app = create_test_app();
    let slot = seed_slot(&app.store).await;

    // The slot shows up in the open listing
    let response = app.server.get("/api/v1/slots").await;
    response.assert_status_ok();
    let listed: Vec<Value> = response.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], json!(slot.id));

    // Checkout returns the hosted payment URL and reserves the slot
    let response = app.server.post("/api/v1/checkout").json(&checkout_body(slot.id)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    let url = body["url"].as_str().unwrap();
    assert!(url.contains("session_id=cs_dummy_"));

    let reserved = app.store.slot(slot.id).await.unwrap().unwrap();
    assert_eq!(reserved.status, SlotStatus::Pending);
    let session_id = reserved.pending_session_id.clone().unwrap();

    // A pending slot disappears from the listing
    let listed: Vec<Value> = app.server.get("/api/v1/slots").await.json();
    assert!(listed.is_empty());

    // No booking yet: the confirmation page poll gets a 404
    let response = app.server.get(&format!("/api/v1/bookings/by-session/{session_id}")).await;
    response.assert_status(StatusCode::NOT_FOUND);

    // The provider delivers the completion event
    let (body, headers) = signed_completion(&session_id, Some(slot.id), &guest_customer());
    let mut request = app.server.post("/webhooks/payments").text(body);
    for (name, value) in headers {
        request = request.add_header(name, value);
    }
    let response = request.await;
    response.assert_status_ok();
    let ack: Value = response.json();
    assert_eq!(ack["received"], json!(true));

    // Slot is booked, booking is confirmed and visible to the poll
    let booked = app.store.slot(slot.id).await.unwrap().unwrap();
    assert_eq!(booked.status, SlotStatus::Booked);
    assert!(booked.pending_session_id.is_none());

    let response = app.server.get(&format!("/api/v1/bookings/by-session/{session_id}")).await;
    response.assert_status_ok();
    let booking: Value = response.json();
    assert_eq!(booking["status"], json!("confirmed"));
    assert_eq!(booking["payment_id"], json!(session_id));
    assert_eq!(booking["price"], json!(40));

    // Nothing was refunded on the happy path
    assert!(app.payments.refunded_sessions().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_duplicate_webhook_delivery_is_noop() {
    let app = create_test_app();
    let slot = seed_slot(&app.store).await;
    let session_id = start_checkout(&app, slot.id).await;

    for _ in 0..2 {
        let (body, headers) = signed_completion(&session_id, Some(slot.id), &guest_customer());
        let mut request = app.server.post("/webhooks/payments").text(body);
        for (name, value) in headers {
            request = request.add_header(name, value);
        }
        request.await.assert_status_ok();
    }

    // One booking, no refunds, slot still booked
    let bookings = app.store.bookings_for_email("guest@example.com").await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].status, BookingStatus::Confirmed);
    assert!(app.payments.refunded_sessions().is_empty());
    assert_eq!(app.store.slot(slot.id).await.unwrap().unwrap().status, SlotStatus::Booked);
}

#[test_log::test(tokio::test)]
async fn test_webhook_bad_signature_is_rejected_without_domain_action() {
    let app = create_test_app();
    let slot = seed_slot(&app.store).await;
    let session_id = start_checkout(&app, slot.id).await;

    let (body, _) = signed_completion(&session_id, Some(slot.id), &guest_customer());
    // Sign with the wrong secret
    let bad_headers = sign_webhook_headers(&body, &crate::payment_providers::signing::generate_secret());

    let mut request = app.server.post("/webhooks/payments").text(body);
    for (name, value) in bad_headers {
        request = request.add_header(name, value);
    }
    let response = request.await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let error: Value = response.json();
    assert_eq!(error["error"], json!("verification_failed"));

    // No booking written, no refund issued, reservation untouched
    assert!(app.store.booking_by_payment_id(&session_id).await.unwrap().is_none());
    assert!(app.payments.refunded_sessions().is_empty());
    assert_eq!(app.store.slot(slot.id).await.unwrap().unwrap().status, SlotStatus::Pending);
}

#[test_log::test(tokio::test)]
async fn test_webhook_missing_correlation_id() {
    let app = create_test_app();

    let (body, headers) = signed_completion("cs_dummy_lost", None, &guest_customer());
    let mut request = app.server.post("/webhooks/payments").text(body);
    for (name, value) in headers {
        request = request.add_header(name, value);
    }
    let response = request.await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[test_log::test(tokio::test)]
async fn test_webhook_for_missing_slot_refunds() {
    let app = create_test_app();
    let ghost = uuid::Uuid::new_v4();

    let (body, headers) = signed_completion("cs_dummy_ghost", Some(ghost), &guest_customer());
    let mut request = app.server.post("/webhooks/payments").text(body);
    for (name, value) in headers {
        request = request.add_header(name, value);
    }
    // Rejection is still an acknowledged outcome
    request.await.assert_status_ok();

    let booking = app.store.booking_by_payment_id("cs_dummy_ghost").await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Failed);
    assert_eq!(booking.failure_reason.as_deref(), Some("slot no longer exists"));
    assert!(booking.refunded);
    assert_eq!(app.payments.refunded_sessions(), vec!["cs_dummy_ghost".to_string()]);
}

#[test_log::test(tokio::test)]
async fn test_checkout_rejects_contested_slot() {
    let app = create_test_app();
    let slot = seed_slot(&app.store).await;

    start_checkout(&app, slot.id).await;

    // A second customer races for the same slot before the TTL elapses
    let response = app
        .server
        .post("/api/v1/checkout")
        .json(&json!({ "slot_id": slot.id, "email": "rival@example.com" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let error: Value = response.json();
    assert_eq!(error["error"], json!("slot_unavailable"));
}

#[test_log::test(tokio::test)]
async fn test_expired_reservation_is_swept_and_rebookable() {
    let app = create_test_app();
    let slot = seed_slot(&app.store).await;

    // Reserve with an expiry already in the past, as if the customer walked
    // away 30 minutes ago
    app.store.reserve_slot(slot.id, Utc::now() - Duration::minutes(1)).await.unwrap();
    app.store.attach_pending_session(slot.id, "cs_dummy_stale").await.unwrap();

    // Listing sweeps the lapsed reservation and offers the slot again
    let listed: Vec<Value> = app.server.get("/api/v1/slots").await.json();
    assert_eq!(listed.len(), 1);

    // And a new customer can reserve it
    let response = app.server.post("/api/v1/checkout").json(&checkout_body(slot.id)).await;
    response.assert_status_ok();
}

#[test_log::test(tokio::test)]
async fn test_cancel_redirect_releases_reservation() {
    let app = create_test_app();
    let slot = seed_slot(&app.store).await;
    start_checkout(&app, slot.id).await;

    let response = app.server.get(&format!("/api/v1/checkout/cancel?slot_id={}", slot.id)).await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/");

    let released = app.store.slot(slot.id).await.unwrap().unwrap();
    assert_eq!(released.status, SlotStatus::Available);
    assert!(released.pending_session_id.is_none());
}

#[test_log::test(tokio::test)]
async fn test_admin_endpoints_require_token() {
    let app = create_test_app();

    let slot_body = json!({
        "start": "2025-06-01T10:00:00Z",
        "end": "2025-06-01T11:00:00Z",
        "capacity": 1,
        "price": 40,
        "location": "centre_court",
        "category": "private",
    });

    // No token
    let response = app.server.post("/api/v1/slots").json(&slot_body).await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    // Wrong token
    let response = app
        .server
        .post("/api/v1/slots")
        .add_header("authorization", "Bearer wrong-token")
        .json(&slot_body)
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    // Correct token
    let response = app
        .server
        .post("/api/v1/slots")
        .add_header("authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
        .json(&slot_body)
        .await;
    response.assert_status(StatusCode::CREATED);
}

#[test_log::test(tokio::test)]
async fn test_generate_hourly_slots() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/v1/slots/generate")
        .add_header("authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
        .json(&json!({
            "date": "2025-06-02",
            "start_hour": 9,
            "end_hour": 12,
            "capacity": 4,
            "price": 25,
            "location": "indoor_arena",
            "category": "group",
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["created"], json!(3));

    let listed: Vec<Value> = app.server.get("/api/v1/slots").await.json();
    assert_eq!(listed.len(), 3);

    // An inverted range is rejected
    let response = app
        .server
        .post("/api/v1/slots/generate")
        .add_header("authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
        .json(&json!({
            "date": "2025-06-02",
            "start_hour": 12,
            "end_hour": 9,
            "capacity": 4,
            "price": 25,
            "location": "indoor_arena",
            "category": "group",
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[test_log::test(tokio::test)]
async fn test_booking_list_is_cached_until_invalidated() {
    let app = create_test_app();
    let slot = seed_slot(&app.store).await;

    // Prime the (empty) cached list for this customer
    let listed: Vec<Value> = app.server.get("/api/v1/bookings?email=guest@example.com").await.json();
    assert!(listed.is_empty());

    // Completing a booking invalidates the cached list
    let session_id = start_checkout(&app, slot.id).await;
    let (body, headers) = signed_completion(&session_id, Some(slot.id), &guest_customer());
    let mut request = app.server.post("/webhooks/payments").text(body);
    for (name, value) in headers {
        request = request.add_header(name, value);
    }
    request.await.assert_status_ok();

    let listed: Vec<Value> = app.server.get("/api/v1/bookings?email=guest@example.com").await.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["status"], json!("confirmed"));
}

#[test_log::test(tokio::test)]
async fn test_admin_cancels_confirmed_booking() {
    let app = create_test_app();
    let slot = seed_slot(&app.store).await;
    let session_id = start_checkout(&app, slot.id).await;

    let (body, headers) = signed_completion(&session_id, Some(slot.id), &guest_customer());
    let mut request = app.server.post("/webhooks/payments").text(body);
    for (name, value) in headers {
        request = request.add_header(name, value);
    }
    request.await.assert_status_ok();

    let booking = app.store.booking_by_payment_id(&session_id).await.unwrap().unwrap();

    let response = app
        .server
        .post(&format!("/api/v1/bookings/{}/cancel", booking.id))
        .add_header("authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
        .await;
    response.assert_status_ok();
    let cancelled: Value = response.json();
    assert_eq!(cancelled["status"], json!("cancelled"));
    assert_eq!(cancelled["refunded"], json!(true));

    // The payment was refunded and the hour is sellable again
    assert_eq!(app.payments.refunded_sessions(), vec![session_id]);
    assert_eq!(app.store.slot(slot.id).await.unwrap().unwrap().status, SlotStatus::Available);
}

#[test_log::test(tokio::test)]
async fn test_checkout_without_payment_provider() {
    let mut config = create_test_config();
    config.payment = None;
    let app = create_test_app_with_config(config);
    let slot = seed_slot(&app.store).await;

    let response = app.server.post("/api/v1/checkout").json(&checkout_body(slot.id)).await;
    response.assert_status(StatusCode::NOT_IMPLEMENTED);
}

#[test_log::test(tokio::test)]
async fn test_checkout_requires_valid_email() {
    let app = create_test_app();
    let slot = seed_slot(&app.store).await;

    let response = app
        .server
        .post("/api/v1/checkout")
        .json(&json!({ "slot_id": slot.id, "email": "not-an-email" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    // The rejected request must not have reserved anything
    assert_eq!(app.store.slot(slot.id).await.unwrap().unwrap().status, SlotStatus::Available);
}
