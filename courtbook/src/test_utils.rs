//! Test utilities: an in-process application over the memory store and the
//! dummy payment provider, plus helpers for seeding slots and signing
//! webhook deliveries.

use std::sync::Arc;

use axum_test::TestServer;
use chrono::{TimeZone, Utc};

use crate::config::{Config, DummyConfig, PaymentConfig};
use crate::payment_providers::dummy::{DummyEvent, DummyProvider};
use crate::payment_providers::{PaymentProvider, signing};
use crate::store::models::{Customer, LessonCategory, Location, Slot, SlotCreate};
use crate::store::{SlotStore, Store, memory::MemoryStore};
use crate::cache::BookingCache;
use crate::{AppState, build_router};

/// Fixed webhook secret so tests can sign deliveries for the provider the
/// app was built with (base64 of 32 bytes).
pub const TEST_WEBHOOK_SECRET: &str = "whsec_MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token-courtbook";

/// A running test application with handles into its store and provider for
/// seeding and assertions.
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub payments: Arc<DummyProvider>,
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        public_url: "http://localhost:8080".to_string(),
        payment: Some(PaymentConfig::Dummy(DummyConfig {
            webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        })),
        admin_token: Some(TEST_ADMIN_TOKEN.to_string()),
        ..Default::default()
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with_config(create_test_config())
}

pub fn create_test_app_with_config(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let payments = Arc::new(DummyProvider::new(TEST_WEBHOOK_SECRET.to_string()));

    let cache = BookingCache::new(config.booking.cache_ttl);

    let dyn_store: Arc<dyn Store> = store.clone();
    let dyn_payments: Option<Arc<dyn PaymentProvider>> = if config.payment.is_some() {
        Some(payments.clone())
    } else {
        None
    };

    let state = AppState::builder()
        .store(dyn_store)
        .config(config)
        .cache(cache)
        .maybe_payments(dyn_payments)
        .build();

    let router = build_router(state.clone()).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        state,
        store,
        payments,
    }
}

/// Insert an available one-hour slot and return it.
pub async fn seed_slot(store: &MemoryStore) -> Slot {
    let slot = Slot::new(SlotCreate {
        start: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(),
        capacity: 1,
        price: 40,
        location: Location::CentreCourt,
        category: LessonCategory::Private,
    });
    store.insert_slot(&slot).await.expect("Failed to seed slot");
    slot
}

pub fn guest_customer() -> Customer {
    Customer {
        user_id: None,
        email: "guest@example.com".to_string(),
    }
}

/// Build a signed `checkout.completed` webhook delivery: the JSON body plus
/// the Standard-Webhooks headers the dummy provider verifies.
pub fn signed_completion(session_id: &str, slot_id: Option<crate::SlotId>, customer: &Customer) -> (String, Vec<(String, String)>) {
    let event = DummyEvent::completed(session_id, slot_id, customer);
    let body = serde_json::to_string(&event).expect("Failed to serialize event");
    let headers = sign_webhook_headers(&body, TEST_WEBHOOK_SECRET);
    (body, headers)
}

/// Sign an arbitrary webhook body with the given secret.
pub fn sign_webhook_headers(body: &str, secret: &str) -> Vec<(String, String)> {
    let msg_id = format!("msg_{}", uuid::Uuid::new_v4().simple());
    let timestamp = Utc::now().timestamp();
    let signature = signing::sign_payload(&msg_id, timestamp, body, secret).expect("Failed to sign payload");

    vec![
        ("webhook-id".to_string(), msg_id),
        ("webhook-timestamp".to_string(), timestamp.to_string()),
        ("webhook-signature".to_string(), signature),
    ]
}
