//! # courtbook: Tennis Lesson Booking Server
//!
//! `courtbook` is the backend for a tennis-lesson booking application: a
//! scheduling API backed by a persistent slot store, with payments handled by
//! a third-party hosted checkout provider.
//!
//! ## Overview
//!
//! The hard problem this service solves is preventing double-booking of a
//! lesson slot while a customer completes an external payment flow. The slot
//! record carries a small state machine (`available -> pending -> booked`)
//! and every transition on the booking path is a conditional write, so
//! concurrent customers, duplicate webhook deliveries, and abandoned
//! checkouts all resolve to at most one confirmed booking per slot.
//!
//! ### Booking flow
//!
//! A customer starts checkout for a slot. The service reserves the slot
//! (conditional `available -> pending` with a 30-minute TTL), creates a
//! hosted checkout session with the payment provider, and attaches the
//! session id to the reservation. When the provider later delivers a
//! completion event, the webhook reconciler verifies the signature, re-reads
//! the slot, and either finalizes the booking or refunds the payment and
//! records a failed booking. Reservations that are abandoned lapse after the
//! TTL and are swept back to available the next time slots are listed.
//!
//! ### Core components
//!
//! - [`store`]: the persistence seam (PostgreSQL via sqlx, or an in-memory
//!   backend for development and tests), exposing read, list, and
//!   conditional-update operations on slots and bookings.
//! - [`booking`]: the workflow itself (reservation manager, checkout
//!   orchestration, webhook reconciler).
//! - [`payment_providers`]: hosted checkout, refunds, and webhook
//!   verification behind the `PaymentProvider` trait (Stripe, plus a dummy
//!   provider for development).
//! - [`api`]: axum handlers and DTOs.
//! - [`cache`]: the bookings-by-customer read-through cache.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use courtbook::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = courtbook::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     courtbook::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod booking;
pub mod cache;
pub mod config;
pub mod errors;
pub mod openapi;
pub mod payment_providers;
pub mod store;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;
#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{Router, http::HeaderValue, routing::get, routing::post};
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::booking::checkout::CheckoutService;
use crate::booking::reconciler::Reconciler;
use crate::booking::reservation::ReservationManager;
use crate::cache::BookingCache;
pub use crate::config::Config;
use crate::errors::Error;
use crate::openapi::ApiDoc;
use crate::payment_providers::PaymentProvider;
use crate::store::Store;
pub use crate::types::{BookingId, SlotId, UserId};

/// Application state shared across all request handlers.
///
/// Holds the persistence seam, the optional payment provider, the booking
/// cache, and the loaded configuration. Services ([`ReservationManager`],
/// [`CheckoutService`], [`Reconciler`]) are constructed on demand from these
/// parts; they are cheap bundles of `Arc` clones.
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub cache: BookingCache,
    pub payments: Option<Arc<dyn PaymentProvider>>,
}

impl AppState {
    /// The reservation manager with the configured TTL.
    pub fn reservations(&self) -> ReservationManager {
        ReservationManager::new(self.store.clone(), self.config.booking.reservation_ttl)
    }

    /// The payment provider, or [`Error::PaymentNotConfigured`] when none is
    /// set up.
    pub fn payments(&self) -> errors::Result<Arc<dyn PaymentProvider>> {
        self.payments.clone().ok_or(Error::PaymentNotConfigured)
    }

    /// The checkout orchestration service.
    pub fn checkout_service(&self) -> errors::Result<CheckoutService> {
        Ok(CheckoutService::new(
            self.store.clone(),
            self.payments()?,
            self.reservations(),
            self.config.public_url.clone(),
        ))
    }

    /// The webhook reconciler.
    pub fn reconciler(&self) -> errors::Result<Reconciler> {
        Ok(Reconciler::new(self.store.clone(), self.payments()?, self.cache.clone()))
    }
}

/// Get the courtbook database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Build the store backend from configuration, running migrations for the
/// PostgreSQL backend.
async fn setup_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match &config.store {
        config::StoreConfig::Memory => {
            info!("Using in-memory store (state is lost on shutdown)");
            Ok(Arc::new(store::memory::MemoryStore::new()))
        }
        config::StoreConfig::Postgres { url, pool } => {
            info!("Connecting to PostgreSQL store");
            let pg_pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(pool.max_connections)
                .min_connections(pool.min_connections)
                .acquire_timeout(std::time::Duration::from_secs(pool.acquire_timeout_secs))
                .connect(url)
                .await?;
            migrator().run(&pg_pool).await?;
            Ok(Arc::new(store::postgres::PgStore::new(pg_pool)))
        }
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    if config.allowed_origins.iter().any(|origin| origin == "*") {
        return Ok(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
    }

    let mut origins = Vec::new();
    for origin in &config.allowed_origins {
        origins.push(origin.parse::<HeaderValue>()?);
    }
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Build the application router with all endpoints and middleware.
///
/// - Customer API under `/api/v1` (slots, checkout, bookings)
/// - Payment webhook at `/webhooks/payments`
/// - OpenAPI docs at `/docs`, spec at `/api-docs/openapi.json`
/// - CORS and request tracing layers
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/slots", get(api::handlers::slots::list_slots).post(api::handlers::slots::create_slot))
        .route("/slots/generate", post(api::handlers::slots::generate_slots))
        .route("/checkout", post(api::handlers::checkout::create_checkout))
        .route("/checkout/cancel", get(api::handlers::checkout::cancel_checkout))
        .route("/bookings", get(api::handlers::bookings::list_bookings))
        .route(
            "/bookings/by-session/{session_id}",
            get(api::handlers::bookings::get_booking_by_session),
        )
        .route("/bookings/{id}/cancel", post(api::handlers::bookings::cancel_booking))
        .with_state(state.clone());

    let cors_layer = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        // Webhook route (registered with the payment provider, not part of the client API)
        .route("/webhooks/payments", post(api::handlers::webhooks::payment_webhook))
        .with_state(state)
        .nest("/api/v1", api_routes)
        .route("/api-docs/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] builds the store (running migrations
///    for PostgreSQL), the payment provider, and the router.
/// 2. **Serve**: [`Application::serve`] binds the TCP port and handles
///    requests until the shutdown future resolves.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        tracing::debug!("Starting courtbook with configuration: {:#?}", config);

        let store = setup_store(&config).await?;

        let payments = config.payment.as_ref().map(payment_providers::create_provider);
        if payments.is_none() {
            tracing::warn!("No payment provider configured; checkout and webhook endpoints will refuse requests");
        }

        let cache = BookingCache::new(config.booking.cache_ttl);

        let state = AppState::builder()
            .store(store)
            .config(config.clone())
            .cache(cache)
            .maybe_payments(payments)
            .build();

        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "courtbook listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutdown complete");
        Ok(())
    }
}
